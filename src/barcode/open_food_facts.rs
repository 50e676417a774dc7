use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{map_product, FoundProduct, LookupError, Product, ProductLookup};

const REGIONS: [&str; 4] = ["world", "us", "in", "uk"];

#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    product: Option<Product>,
}

/// Open Food Facts v0 product API. Regional mirrors are tried in order until
/// one knows the barcode.
#[derive(Debug, Clone)]
pub struct OpenFoodFactsClient {
    /// Base URL with a `{region}` placeholder, e.g. `https://{region}.openfoodfacts.org`.
    url_template: String,
    client: Client,
}

impl OpenFoodFactsClient {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            client: Client::new(),
        }
    }

    fn product_url(&self, region: &str, barcode: &str) -> String {
        format!(
            "{}/api/v0/product/{}.json",
            self.url_template.replace("{region}", region).trim_end_matches('/'),
            barcode
        )
    }

    async fn fetch(&self, url: &str) -> Result<Option<Product>, LookupError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LookupError::Upstream(e.to_string()))?;
        if !response.status().is_success() {
            warn!(status = %response.status(), url = %url, "product lookup returned an error status");
            return Ok(None);
        }
        let body: ProductResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Upstream(format!("malformed product response: {e}")))?;
        Ok(match body {
            ProductResponse {
                status: 1,
                product: Some(p),
            } => Some(p),
            _ => None,
        })
    }
}

#[async_trait]
impl ProductLookup for OpenFoodFactsClient {
    async fn lookup(&self, barcode: &str) -> Result<FoundProduct, LookupError> {
        let mut failures = 0;
        let mut last_err = None;
        for region in REGIONS {
            let url = self.product_url(region, barcode);
            debug!(%url, "looking up product");
            match self.fetch(&url).await {
                Ok(Some(product)) => {
                    let nutrition = map_product(&product);
                    info!(%barcode, %region, name = %nutrition.food_name, "product found");
                    return Ok(FoundProduct {
                        barcode: barcode.to_string(),
                        nutrition,
                        image_url: product.image_url.clone(),
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, %region, "product lookup failed; trying next region");
                    failures += 1;
                    last_err = Some(e);
                }
            }
        }
        // every mirror errored: report the transport failure, not a miss
        match last_err {
            Some(e) if failures == REGIONS.len() => Err(e),
            _ => Err(LookupError::NotFound),
        }
    }
}
