//! Secret fetching utilities for Kubernetes secrets

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};

use crate::error::{Error, Result};

/// Fetch a secret from Kubernetes
pub async fn get_secret(client: &Client, name: &str, namespace: &str) -> Result<Secret> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    secrets.get(name).await.map_err(|e| match e {
        kube::Error::Api(api_err) if api_err.code == 404 => {
            Error::not_found("Secret", format!("{}/{}", namespace, name))
        }
        other => Error::Kube(other),
    })
}

/// Decoded key/value pairs of a secret
pub fn secret_data(secret: &Secret) -> BTreeMap<String, Vec<u8>> {
    let mut values: BTreeMap<String, Vec<u8>> = secret
        .data
        .iter()
        .flatten()
        .map(|(key, bytes)| (key.clone(), bytes.0.clone()))
        .collect();

    // stringData only shows up on objects that never went through the API server
    for (key, value) in secret.string_data.iter().flatten() {
        values
            .entry(key.clone())
            .or_insert_with(|| value.clone().into_bytes());
    }
    values
}

/// Get a string value from decoded secret data
pub fn secret_string(values: &BTreeMap<String, Vec<u8>>, key: &str) -> Option<String> {
    values
        .get(key)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;

    #[test]
    fn secret_data_decodes_both_maps() {
        let secret = Secret {
            data: Some(BTreeMap::from([(
                "root".to_string(),
                ByteString(b"s3cret".to_vec()),
            )])),
            string_data: Some(BTreeMap::from([
                ("root".to_string(), "ignored".to_string()),
                ("monitor".to_string(), "m".to_string()),
            ])),
            ..Default::default()
        };
        let values = secret_data(&secret);
        assert_eq!(secret_string(&values, "root").as_deref(), Some("s3cret"));
        assert_eq!(secret_string(&values, "monitor").as_deref(), Some("m"));
        assert_eq!(secret_string(&values, "missing"), None);
    }
}
