use serde::{Deserialize, Serialize};

use crate::meals::services::BarcodeSource;

/// `{ "image": "data:image/jpeg;base64,..." }`
#[derive(Debug, Deserialize)]
pub struct CreateMealRequest {
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMealsRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteMealsResponse {
    pub deleted: usize,
}

/// Either a typed barcode or a photo of one. A typed code wins when both
/// are present.
#[derive(Debug, Deserialize)]
pub struct BarcodeRequest {
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl BarcodeRequest {
    pub fn into_source(self) -> Option<BarcodeSource> {
        match (self.barcode, self.image) {
            (Some(code), _) if !code.trim().is_empty() => Some(BarcodeSource::Code(code)),
            (_, Some(image)) => Some(BarcodeSource::Image(image)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barcode_request_prefers_typed_code() {
        let req: BarcodeRequest =
            serde_json::from_str(r#"{"barcode":"737628064502","image":"data:,x"}"#).unwrap();
        assert!(matches!(req.into_source(), Some(BarcodeSource::Code(c)) if c == "737628064502"));

        let req: BarcodeRequest = serde_json::from_str(r#"{"barcode":"  ","image":"data:,x"}"#).unwrap();
        assert!(matches!(req.into_source(), Some(BarcodeSource::Image(_))));

        let req: BarcodeRequest = serde_json::from_str("{}").unwrap();
        assert!(req.into_source().is_none());
    }
}
