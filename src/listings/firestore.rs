//! Firestore REST backend for listings and profiles.
//!
//! Talks to the Firestore v1 document API over JSON.  Documents are
//! converted between `serde_json` values and Firestore's typed-value
//! envelope (`stringValue`, `integerValue`, `mapValue`, ...) at this
//! boundary so the rest of the crate only ever sees plain serde types.

use std::future::Future;
use std::pin::Pin;

use anyhow::{anyhow, Context};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::store::ListingStore;
use super::{Listing, NewListing};
use crate::config::FirebaseConfig;
use crate::identity::gateway::SharedIdToken;
use crate::profile::{ProfileStore, UserProfile};

const FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com/v1";
const LISTINGS_COLLECTION: &str = "products";
const PROFILES_COLLECTION: &str = "users";

/// Firestore-backed [`ListingStore`] and [`ProfileStore`].
///
/// Requests carry the signed-in user's bearer token when one is
/// present; unauthenticated reads are still attempted so public
/// browsing works before sign-in.
pub struct FirestoreStore {
    http: reqwest::Client,
    documents_root: String,
    token: SharedIdToken,
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RunQueryEntry {
    #[serde(default)]
    document: Option<FirestoreDocument>,
}

#[derive(Debug, Deserialize)]
struct FirestoreErrorResponse {
    error: FirestoreErrorBody,
}

#[derive(Debug, Deserialize)]
struct FirestoreErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl FirestoreStore {
    pub fn new(config: &FirebaseConfig, token: SharedIdToken) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            http,
            documents_root: format!(
                "{}/projects/{}/databases/(default)/documents",
                FIRESTORE_ENDPOINT, config.project_id
            ),
            token,
        })
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.documents_root,
            collection,
            utf8_percent_encode(id, NON_ALPHANUMERIC)
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.get() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_document(
        &self,
        collection: &str,
        id: &str,
    ) -> anyhow::Result<Option<FirestoreDocument>> {
        let response = self
            .authorized(self.http.get(self.document_url(collection, id)))
            .send()
            .await
            .context("firestore get request failed")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(map_firestore_error("get document", status, &body));
        }
        let document: FirestoreDocument =
            serde_json::from_str(&body).context("invalid firestore document response")?;
        Ok(Some(document))
    }

    async fn run_equality_query(
        &self,
        field_path: &str,
        value: &str,
    ) -> anyhow::Result<Vec<Listing>> {
        let body = build_equality_query(LISTINGS_COLLECTION, field_path, value);
        let response = self
            .authorized(
                self.http
                    .post(format!("{}:runQuery", self.documents_root))
                    .json(&body),
            )
            .send()
            .await
            .context("firestore query request failed")?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(map_firestore_error("run query", status, &text));
        }
        let entries: Vec<RunQueryEntry> =
            serde_json::from_str(&text).context("invalid firestore query response")?;
        let mut listings = Vec::new();
        for entry in entries {
            // The stream interleaves documents with readTime-only
            // progress entries; skip the latter.
            if let Some(document) = entry.document {
                listings.push(document_to_listing(document)?);
            }
        }
        debug!(field = field_path, value, count = listings.len(), "firestore query");
        Ok(listings)
    }
}

impl ListingStore for FirestoreStore {
    fn insert(
        &self,
        new: NewListing,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Listing>> + Send + '_>> {
        Box::pin(async move {
            let fields = value_to_fields(
                serde_json::to_value(&new).context("listing serialization failed")?,
            )?;
            let response = self
                .authorized(
                    self.http
                        .post(format!("{}/{}", self.documents_root, LISTINGS_COLLECTION))
                        .json(&json!({ "fields": fields })),
                )
                .send()
                .await
                .context("firestore create request failed")?;
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(map_firestore_error("create listing", status, &body));
            }
            let document: FirestoreDocument =
                serde_json::from_str(&body).context("invalid firestore create response")?;
            let id = document_id(&document.name).to_string();
            Ok(new.into_listing(id))
        })
    }

    fn get(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Listing>>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            match self.fetch_document(LISTINGS_COLLECTION, &id).await? {
                Some(document) => Ok(Some(document_to_listing(document)?)),
                None => Ok(None),
            }
        })
    }

    fn query_by_campus(
        &self,
        campus: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<Listing>>> + Send + '_>> {
        let campus = campus.to_string();
        Box::pin(async move { self.run_equality_query("university", &campus).await })
    }

    fn query_by_owner(
        &self,
        seller_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<Listing>>> + Send + '_>> {
        let seller_id = seller_id.to_string();
        Box::pin(async move { self.run_equality_query("sellerId", &seller_id).await })
    }

    fn set_sold(
        &self,
        id: &str,
        sold: bool,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let url = format!(
                "{}?updateMask.fieldPaths=isSold&currentDocument.exists=true",
                self.document_url(LISTINGS_COLLECTION, &id)
            );
            let body = json!({ "fields": { "isSold": { "booleanValue": sold } } });
            let response = self
                .authorized(self.http.patch(url).json(&body))
                .send()
                .await
                .context("firestore patch request failed")?;
            let status = response.status();
            // The exists precondition turns a missing document into a
            // 404, which we treat as already-done.
            if status == StatusCode::NOT_FOUND || status.is_success() {
                return Ok(());
            }
            let text = response.text().await.unwrap_or_default();
            Err(map_firestore_error("update sold flag", status, &text))
        })
    }

    fn delete(&self, id: &str) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let response = self
                .authorized(self.http.delete(self.document_url(LISTINGS_COLLECTION, &id)))
                .send()
                .await
                .context("firestore delete request failed")?;
            let status = response.status();
            if status == StatusCode::NOT_FOUND || status.is_success() {
                return Ok(());
            }
            let text = response.text().await.unwrap_or_default();
            Err(map_firestore_error("delete listing", status, &text))
        })
    }
}

impl ProfileStore for FirestoreStore {
    fn get(
        &self,
        uid: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserProfile>>> + Send + '_>> {
        let uid = uid.to_string();
        Box::pin(async move {
            match self.fetch_document(PROFILES_COLLECTION, &uid).await? {
                Some(document) => {
                    let value = fields_to_value(document.fields);
                    let profile = serde_json::from_value(value)
                        .context("invalid profile document shape")?;
                    Ok(Some(profile))
                }
                None => Ok(None),
            }
        })
    }

    fn set(
        &self,
        uid: &str,
        profile: UserProfile,
        merge: bool,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let uid = uid.to_string();
        Box::pin(async move {
            let value = serde_json::to_value(&profile).context("profile serialization failed")?;
            let mut url = self.document_url(PROFILES_COLLECTION, &uid);
            if merge {
                // Masked patch: only fields named in the mask are
                // touched, everything else on the document survives.
                let paths: Vec<String> = value
                    .as_object()
                    .map(|object| {
                        object
                            .keys()
                            .map(|key| format!("updateMask.fieldPaths={key}"))
                            .collect()
                    })
                    .unwrap_or_default();
                if !paths.is_empty() {
                    url = format!("{url}?{}", paths.join("&"));
                }
            }
            let fields = value_to_fields(value)?;
            let response = self
                .authorized(self.http.patch(url).json(&json!({ "fields": fields })))
                .send()
                .await
                .context("firestore profile write failed")?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(map_firestore_error("write profile", status, &body))
        })
    }
}

// -- Typed-value conversion ------------------------------------------------

/// Wrap a `serde_json` value in Firestore's typed-value envelope.
fn json_to_fire(value: Value) -> anyhow::Result<Value> {
    Ok(match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                // Firestore carries 64-bit integers as strings.
                json!({ "integerValue": i.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items
                .into_iter()
                .map(json_to_fire)
                .collect::<anyhow::Result<_>>()?;
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": Value::Object(value_to_fields(Value::Object(map))?) } }),
    })
}

/// Unwrap one typed value back to plain `serde_json`.
fn fire_to_json(value: &Value) -> Value {
    let Some(object) = value.as_object() else {
        return Value::Null;
    };
    if let Some(s) = object.get("stringValue").and_then(Value::as_str) {
        return Value::String(s.to_string());
    }
    if let Some(b) = object.get("booleanValue").and_then(Value::as_bool) {
        return Value::Bool(b);
    }
    if let Some(raw) = object.get("integerValue") {
        // Accepted as either a string or a bare number.
        let parsed = raw
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| raw.as_i64());
        if let Some(i) = parsed {
            return json!(i);
        }
    }
    if let Some(d) = object.get("doubleValue").and_then(Value::as_f64) {
        return json!(d);
    }
    if let Some(array) = object
        .get("arrayValue")
        .and_then(|a| a.get("values"))
        .and_then(Value::as_array)
    {
        return Value::Array(array.iter().map(fire_to_json).collect());
    }
    if let Some(fields) = object
        .get("mapValue")
        .and_then(|m| m.get("fields"))
        .and_then(Value::as_object)
    {
        return fields_to_value(fields.clone());
    }
    if let Some(ts) = object.get("timestampValue").and_then(Value::as_str) {
        return Value::String(ts.to_string());
    }
    Value::Null
}

/// Convert a plain JSON object into a Firestore `fields` map.
fn value_to_fields(value: Value) -> anyhow::Result<Map<String, Value>> {
    let Value::Object(object) = value else {
        return Err(anyhow!("document body must be a JSON object"));
    };
    let mut fields = Map::new();
    for (key, field) in object {
        fields.insert(key, json_to_fire(field)?);
    }
    Ok(fields)
}

/// Convert a Firestore `fields` map back into a plain JSON object.
fn fields_to_value(fields: Map<String, Value>) -> Value {
    let mut object = Map::new();
    for (key, field) in &fields {
        object.insert(key.clone(), fire_to_json(field));
    }
    Value::Object(object)
}

fn document_to_listing(document: FirestoreDocument) -> anyhow::Result<Listing> {
    let id = document_id(&document.name).to_string();
    let value = fields_to_value(document.fields);
    let mut listing: Listing =
        serde_json::from_value(value).context("invalid listing document shape")?;
    listing.id = id;
    Ok(listing)
}

/// Last path segment of a full document resource name.
fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn build_equality_query(collection: &str, field_path: &str, value: &str) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": field_path },
                    "op": "EQUAL",
                    "value": { "stringValue": value }
                }
            }
        }
    })
}

fn map_firestore_error(context: &str, status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<FirestoreErrorResponse>(body) {
        return anyhow!(
            "{context}: {} ({}, http {status})",
            parsed.error.message,
            parsed.error.status
        );
    }
    anyhow!("{context}: http {status}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listings::{Category, Condition};

    #[test]
    fn test_typed_value_round_trip() {
        let original = json!({
            "title": "Physics Textbook",
            "price": 1500.5,
            "createdAt": 1_700_000_000_000i64,
            "isSold": false,
            "images": ["https://img.example/a.jpg", "https://img.example/b.jpg"],
            "meta": { "views": 3 }
        });
        let fields = value_to_fields(original.clone()).unwrap();
        assert_eq!(fields["title"], json!({ "stringValue": "Physics Textbook" }));
        assert_eq!(
            fields["createdAt"],
            json!({ "integerValue": "1700000000000" })
        );
        assert_eq!(fields["price"], json!({ "doubleValue": 1500.5 }));

        let back = fields_to_value(fields);
        assert_eq!(back, original);
    }

    #[test]
    fn test_integer_value_accepts_bare_numbers() {
        let value = json!({ "integerValue": 42 });
        assert_eq!(fire_to_json(&value), json!(42));
    }

    #[test]
    fn test_document_id_strips_resource_prefix() {
        let name = "projects/demo/databases/(default)/documents/products/abc123";
        assert_eq!(document_id(name), "abc123");
        assert_eq!(document_id("bare"), "bare");
    }

    #[test]
    fn test_equality_query_shape() {
        let body = build_equality_query("products", "university", "FUTA");
        let query = &body["structuredQuery"];
        assert_eq!(query["from"][0]["collectionId"], "products");
        let filter = &query["where"]["fieldFilter"];
        assert_eq!(filter["field"]["fieldPath"], "university");
        assert_eq!(filter["op"], "EQUAL");
        assert_eq!(filter["value"]["stringValue"], "FUTA");
    }

    #[test]
    fn test_document_to_listing_injects_id() {
        let new = NewListing {
            title: "Desk Lamp".to_string(),
            description: "Bright".to_string(),
            price: 2000.0,
            category: Category::DormEssentials,
            condition: Condition::New,
            images: vec!["https://img.example/lamp.jpg".to_string()],
            campus: "FUTA".to_string(),
            seller_id: "uid-1".to_string(),
            seller_name: "Ada".to_string(),
            created_at: 99,
            is_sold: false,
        };
        let fields = value_to_fields(serde_json::to_value(&new).unwrap()).unwrap();
        let document = FirestoreDocument {
            name: "projects/demo/databases/(default)/documents/products/doc-7".to_string(),
            fields,
        };
        let listing = document_to_listing(document).unwrap();
        assert_eq!(listing.id, "doc-7");
        assert_eq!(listing.campus, "FUTA");
        assert_eq!(listing.category, Category::DormEssentials);
    }

    #[test]
    fn test_error_mapping_prefers_api_message() {
        let body = r#"{"error":{"code":403,"message":"Missing or insufficient permissions.","status":"PERMISSION_DENIED"}}"#;
        let err = map_firestore_error("create listing", StatusCode::FORBIDDEN, body);
        let text = err.to_string();
        assert!(text.contains("Missing or insufficient permissions."));
        assert!(text.contains("PERMISSION_DENIED"));

        let fallback = map_firestore_error("create listing", StatusCode::BAD_GATEWAY, "<html>");
        assert!(fallback.to_string().contains("http 502"));
    }
}
