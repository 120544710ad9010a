use std::{ops::Deref, sync::Arc};

use reqwest::{Client, ClientBuilder, IntoUrl};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};

use crate::VidlensResult;

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> VidlensResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store.clone()).build()?;

        Ok(Self {
            client,
            cookies_store,
        })
    }

    pub fn add_cookies(&self, cookies: Vec<String>, url: impl IntoUrl) -> VidlensResult<()> {
        let url = url.into_url()?;
        let mut lock = match self.cookies_store.lock() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        for cookie in cookies {
            if let Err(e) = lock.parse(&cookie, &url) {
                tracing::warn!("Ignored invalid cookie {cookie}: {e}");
            }
        }
        Ok(())
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Client::builder()).expect("failed to build the default HTTP client")
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    #[tokio::test]
    async fn test_cookies_are_sent_to_their_host() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.m3u8"))
            .and(header("cookie", "session=abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::default();
        client.add_cookies(vec!["session=abc".to_string()], server.uri())?;

        let response = client
            .get(format!("{}/index.m3u8", server.uri()))
            .send()
            .await?;
        assert_eq!(response.status(), 200);
        Ok(())
    }

    #[test]
    fn test_add_cookies_rejects_invalid_url() {
        let client = HttpClient::default();
        assert!(client
            .add_cookies(vec!["session=abc".to_string()], "not a url")
            .is_err());
    }
}
