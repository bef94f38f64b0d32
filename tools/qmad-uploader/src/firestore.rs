//! Firestore REST implementation of [`DocumentStore`].

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ConfigError, StoreError};
use crate::store::{DocumentStore, DocumentWrite, WriteMode};

const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";
const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// The emulator accepts this token as an admin credential.
const EMULATOR_TOKEN: &str = "owner";

fn default_token_uri() -> String {
  DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a Google service-account key file that the uploader uses.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
  pub project_id: String,
  pub client_email: String,
  pub private_key: String,
  #[serde(default = "default_token_uri")]
  pub token_uri: String,
}

impl ServiceAccount {
  pub fn from_json(blob: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(blob)?)
  }
}

impl std::fmt::Debug for ServiceAccount {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ServiceAccount")
      .field("project_id", &self.project_id)
      .field("client_email", &self.client_email)
      .finish_non_exhaustive()
  }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
  iss: &'a str,
  scope: &'a str,
  aud: &'a str,
  iat: i64,
  exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
  access_token: String,
}

// ---------------------------------------------------------------------------
// Value encoding
// ---------------------------------------------------------------------------

/// JSON value to Firestore `Value`. Integers become `integerValue` strings.
pub fn encode_value(value: &Value) -> Value {
  match value {
    Value::Null => json!({ "nullValue": null }),
    Value::Bool(b) => json!({ "booleanValue": b }),
    Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "integerValue": n.to_string() }),
    Value::Number(n) => json!({ "doubleValue": n.as_f64().unwrap_or(0.0) }),
    Value::String(s) => json!({ "stringValue": s }),
    Value::Array(items) => json!({
      "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
    }),
    Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
  }
}

pub fn encode_fields(map: &Map<String, Value>) -> Value {
  Value::Object(
    map
      .iter()
      .map(|(k, v)| (k.clone(), encode_value(v)))
      .collect(),
  )
}

/// Backtick-quote segments that are not simple identifiers.
fn quote_segment(segment: &str) -> String {
  let mut chars = segment.chars();
  let simple = chars
    .next()
    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
  if simple {
    segment.to_string()
  } else {
    format!("`{}`", segment.replace('\\', "\\\\").replace('`', "\\`"))
  }
}

/// Dotted paths to every leaf; a non-empty map contributes its children
/// instead of itself.
pub fn leaf_paths(map: &Map<String, Value>) -> Vec<String> {
  let mut out = Vec::new();
  collect_leaf_paths(map, "", &mut out);
  out
}

fn collect_leaf_paths(map: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
  for (key, value) in map {
    let path = if prefix.is_empty() {
      quote_segment(key)
    } else {
      format!("{}.{}", prefix, quote_segment(key))
    };
    match value {
      Value::Object(child) if !child.is_empty() => collect_leaf_paths(child, &path, out),
      _ => out.push(path),
    }
  }
}

/// Body of a `documents:commit` request holding exactly one write.
pub fn commit_request(database: &str, write: &DocumentWrite) -> Value {
  let mut w = Map::new();
  w.insert(
    "update".to_string(),
    json!({
      "name": format!("{}/documents/{}", database, write.path),
      "fields": encode_fields(&write.fields),
    }),
  );
  if write.mode == WriteMode::Merge {
    w.insert(
      "updateMask".to_string(),
      json!({ "fieldPaths": leaf_paths(&write.fields) }),
    );
  }
  if !write.server_timestamps.is_empty() {
    let transforms: Vec<Value> = write
      .server_timestamps
      .iter()
      .map(|path| json!({ "fieldPath": path, "setToServerValue": "REQUEST_TIME" }))
      .collect();
    w.insert("updateTransforms".to_string(), Value::Array(transforms));
  }
  json!({ "writes": [Value::Object(w)] })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct FirestoreStore {
  http: Client,
  base_url: String,
  database: String,
  token: String,
}

impl FirestoreStore {
  /// Exchange the service-account key for an access token, or talk to the
  /// emulator when `emulator_host` is given.
  pub fn connect(account: &ServiceAccount, emulator_host: Option<&str>) -> Result<Self, StoreError> {
    let http = Client::builder().user_agent("qmad-uploader").build()?;
    let (base_url, token) = match emulator_host.filter(|h| !h.is_empty()) {
      Some(host) => {
        tracing::info!("Using Firestore emulator at {}", host);
        (format!("http://{}/v1", host), EMULATOR_TOKEN.to_string())
      }
      None => (FIRESTORE_URL.to_string(), fetch_access_token(&http, account)?),
    };
    Ok(Self {
      http,
      base_url,
      database: format!("projects/{}/databases/(default)", account.project_id),
      token,
    })
  }
}

fn fetch_access_token(http: &Client, account: &ServiceAccount) -> Result<String, StoreError> {
  let now = Utc::now().timestamp();
  let claims = AssertionClaims {
    iss: &account.client_email,
    scope: DATASTORE_SCOPE,
    aud: &account.token_uri,
    iat: now,
    exp: now + 3600,
  };
  let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
    .map_err(|e| StoreError::credentials(format!("private key: {}", e)))?;
  let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
    .map_err(|e| StoreError::credentials(format!("sign assertion: {}", e)))?;

  let resp = http
    .post(&account.token_uri)
    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
    .send()?;
  let status = resp.status();
  if !status.is_success() {
    let body = resp.text().unwrap_or_default();
    return Err(StoreError::credentials(format!(
      "token exchange returned {}: {}",
      status.as_u16(),
      body
    )));
  }
  let token: TokenResponse = resp.json()?;
  Ok(token.access_token)
}

impl DocumentStore for FirestoreStore {
  fn write(&self, write: &DocumentWrite) -> Result<(), StoreError> {
    let url = format!("{}/{}/documents:commit", self.base_url, self.database);
    let body = commit_request(&self.database, write);
    let resp = self
      .http
      .post(&url)
      .bearer_auth(&self.token)
      .json(&body)
      .send()?;

    let status = resp.status();
    if !status.is_success() {
      return Err(StoreError::Rejected {
        path: write.path.clone(),
        status: status.as_u16(),
        body: resp.text().unwrap_or_default(),
      });
    }
    tracing::debug!("committed {}", write.path);
    Ok(())
  }
}
