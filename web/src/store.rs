use core::future::Future;

use fogwarden_protocol::{PersistedCell, SessionKey};
use fogwarden_sync::{FogStore, StoreError};
use futures_util::{
    future::{Either, select},
    pin_mut,
};
use gloo::{
    storage::{LocalStorage, Storage, errors::StorageError},
    timers::future::TimeoutFuture,
};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Headers, Request, RequestInit, RequestMode, Response};
use web_time::Duration;

use crate::options::StoreOptions;

const TABLE: &str = "fog_of_war";

fn storage_key(key: &SessionKey) -> String {
    format!("fogwarden:{}:{}", key.session_id, key.map_id)
}

fn js_error(err: JsValue) -> StoreError {
    StoreError::Unavailable(format!("{err:?}"))
}

/// Fails with [`StoreError::Timeout`] when `request` takes longer than `timeout`.
async fn with_timeout<T>(
    timeout: Duration,
    request: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
    let sleep = TimeoutFuture::new(millis);
    pin_mut!(request);
    pin_mut!(sleep);
    match select(request, sleep).await {
        Either::Left((result, _)) => result,
        Either::Right(_) => Err(StoreError::Timeout),
    }
}

/// Keeps fog rows in the browser, one JSON array per session and map.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct LocalStorageStore;

impl FogStore for LocalStorageStore {
    async fn load(&self, key: &SessionKey) -> Result<Vec<PersistedCell>, StoreError> {
        match LocalStorage::get(storage_key(key)) {
            Ok(rows) => Ok(rows),
            Err(StorageError::KeyNotFound(_)) => Ok(Vec::new()),
            Err(StorageError::SerdeError(err)) => Err(StoreError::Codec(err.to_string())),
            Err(err) => Err(StoreError::Unavailable(err.to_string())),
        }
    }

    async fn replace(&self, key: &SessionKey, cells: Vec<PersistedCell>) -> Result<(), StoreError> {
        LocalStorage::set(storage_key(key), cells).map_err(|err| StoreError::Unavailable(err.to_string()))
    }
}

/// Talks to a PostgREST style endpoint exposing the `fog_of_war` table.
#[derive(Clone, Debug)]
pub(crate) struct RestStore {
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), TABLE)
    }

    fn rows_url(&self, key: &SessionKey) -> String {
        let encode = |value: &str| String::from(js_sys::encode_uri_component(value));
        format!(
            "{}?session_id=eq.{}&map_id=eq.{}",
            self.table_url(),
            encode(&key.session_id),
            encode(&key.map_id)
        )
    }

    async fn send(&self, method: &str, url: &str, body: Option<String>) -> Result<String, StoreError> {
        let headers = Headers::new().map_err(js_error)?;
        headers.set("apikey", &self.api_key).map_err(js_error)?;
        headers
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .map_err(js_error)?;
        headers.set("Content-Type", "application/json").map_err(js_error)?;

        let init = RequestInit::new();
        init.set_method(method);
        init.set_mode(RequestMode::Cors);
        init.set_headers(&headers);
        if let Some(body) = body {
            init.set_body(&JsValue::from_str(&body));
        }
        let request = Request::new_with_str_and_init(url, &init).map_err(js_error)?;

        let response: Response = JsFuture::from(gloo::utils::window().fetch_with_request(&request))
            .await
            .map_err(js_error)?
            .dyn_into()
            .map_err(js_error)?;
        if !response.ok() {
            return Err(StoreError::Rejected(format!(
                "{} {} answered {}",
                method,
                TABLE,
                response.status()
            )));
        }
        let text = JsFuture::from(response.text().map_err(js_error)?)
            .await
            .map_err(js_error)?;
        Ok(text.as_string().unwrap_or_default())
    }
}

impl FogStore for RestStore {
    async fn load(&self, key: &SessionKey) -> Result<Vec<PersistedCell>, StoreError> {
        with_timeout(self.timeout, async {
            let body = self.send("GET", &self.rows_url(key), None).await?;
            serde_json::from_str(&body).map_err(|err| StoreError::Codec(err.to_string()))
        })
        .await
    }

    async fn replace(&self, key: &SessionKey, cells: Vec<PersistedCell>) -> Result<(), StoreError> {
        with_timeout(self.timeout, async {
            self.send("DELETE", &self.rows_url(key), None).await?;
            if !cells.is_empty() {
                let body = serde_json::to_string(&cells).map_err(|err| StoreError::Codec(err.to_string()))?;
                self.send("POST", &self.table_url(), Some(body)).await?;
            }
            Ok(())
        })
        .await
    }
}

/// The store picked by the join options.
#[derive(Clone, Debug)]
pub(crate) enum AnyStore {
    Local(LocalStorageStore),
    Rest(RestStore),
}

impl AnyStore {
    pub fn from_options(options: &StoreOptions, timeout: Duration) -> Self {
        match options {
            StoreOptions::LocalStorage => Self::Local(LocalStorageStore),
            StoreOptions::Rest { base_url, api_key } => Self::Rest(RestStore::new(base_url, api_key, timeout)),
        }
    }
}

impl FogStore for AnyStore {
    async fn load(&self, key: &SessionKey) -> Result<Vec<PersistedCell>, StoreError> {
        match self {
            Self::Local(store) => store.load(key).await,
            Self::Rest(store) => store.load(key).await,
        }
    }

    async fn replace(&self, key: &SessionKey, cells: Vec<PersistedCell>) -> Result<(), StoreError> {
        match self {
            Self::Local(store) => store.replace(key, cells).await,
            Self::Rest(store) => store.replace(key, cells).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_separate_maps() {
        let a = storage_key(&SessionKey::new("s1", "a"));
        let b = storage_key(&SessionKey::new("s1", "b"));
        assert_eq!(a, "fogwarden:s1:a");
        assert_ne!(a, b);
    }

    #[test]
    fn store_follows_options() {
        let timeout = Duration::from_secs(5);
        assert!(matches!(
            AnyStore::from_options(&StoreOptions::LocalStorage, timeout),
            AnyStore::Local(_)
        ));

        let rest = StoreOptions::Rest {
            base_url: "https://db.example/rest/v1/".into(),
            api_key: "anon".into(),
        };
        let AnyStore::Rest(store) = AnyStore::from_options(&rest, timeout) else {
            panic!("expected a rest store");
        };
        assert_eq!(store.table_url(), "https://db.example/rest/v1/fog_of_war");
    }
}
