//! # Streaming Client
//!
//! Resolves a book's manifest through the manifest loader slot and hands
//! fragment loads to the fragment loader slot. Either slot can be any
//! [`Loader`]; the service plugs in the caching ones.
//!
//! ```text
//!  attach(url) ──> manifest loader ──> master? ──> first variant ──> Manifest
//!                                                                   │
//!  load_fragment(url) ──> fragment loader            fragments + sections
//! ```

use crate::error::{LoadError, Result};
use crate::loader::{Loader, LoaderContext, LoaderResponse};
use crate::manifest::{parse_playlist, Manifest, Playlist};
use core_async::sync::CancellationToken;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

#[derive(Clone)]
pub struct StreamingClient {
    manifest_loader: Arc<dyn Loader>,
    fragment_loader: Arc<dyn Loader>,
}

impl StreamingClient {
    pub fn new(manifest_loader: Arc<dyn Loader>, fragment_loader: Arc<dyn Loader>) -> Self {
        Self {
            manifest_loader,
            fragment_loader,
        }
    }

    /// Load and parse the manifest at `url`, following a master playlist to
    /// its first variant.
    #[instrument(skip(self, cancel), fields(url = %url))]
    pub async fn attach(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> std::result::Result<Manifest, LoadError> {
        let manifest = match self.load_playlist(url, cancel).await? {
            Playlist::Media(manifest) => manifest,
            Playlist::Master(variants) => {
                let Some(first) = variants.first() else {
                    return Err(LoadError::InvalidResponse {
                        url: url.to_string(),
                        message: "master playlist has no variants".to_string(),
                    });
                };
                let variant_url = Url::parse(first).map_err(|e| LoadError::InvalidResponse {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
                debug!(variant = %variant_url, "Following master playlist");
                match self.load_playlist(&variant_url, cancel).await? {
                    Playlist::Media(manifest) => manifest,
                    Playlist::Master(_) => {
                        return Err(LoadError::InvalidResponse {
                            url: variant_url.to_string(),
                            message: "nested master playlist".to_string(),
                        })
                    }
                }
            }
        };

        info!(
            fragments = manifest.fragments.len(),
            sections = manifest.sections.len(),
            "Manifest attached"
        );
        Ok(manifest)
    }

    /// Every fragment URL of the manifest at `url`, in playback order. A
    /// book with no narration yet lists none.
    pub async fn fragment_urls(&self, url: &Url) -> Result<Vec<String>> {
        let manifest = self.attach(url, &CancellationToken::new()).await?;
        if manifest.fragments.is_empty() {
            debug!(url = %url, "Manifest lists no fragments");
        }
        Ok(manifest.fragment_urls())
    }

    pub async fn load_fragment(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<LoaderResponse, LoadError> {
        let context = LoaderContext::fragment(url).with_cancel(cancel.clone());
        self.fragment_loader.load(&context).await
    }

    async fn load_playlist(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> std::result::Result<Playlist, LoadError> {
        let context = LoaderContext::manifest(url.as_str()).with_cancel(cancel.clone());
        let response = self.manifest_loader.load(&context).await?;
        parse_playlist(url, response.text()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StaticLoader(HashMap<String, String>);

    #[async_trait]
    impl Loader for StaticLoader {
        async fn load(
            &self,
            context: &LoaderContext,
        ) -> std::result::Result<LoaderResponse, LoadError> {
            self.0
                .get(&context.url)
                .map(|body| LoaderResponse::new(context.url.clone(), body.clone().into_bytes()))
                .ok_or_else(|| LoadError::Http {
                    url: context.url.clone(),
                    status: 404,
                })
        }
    }

    const MEDIA: &str = "#EXTM3U
#EXT-X-TARGETDURATION:10
#EXTINF:10.0,
0.ts
#EXTINF:10.0,
1.ts
#EXT-X-ENDLIST
";

    fn client(entries: &[(&str, &str)]) -> StreamingClient {
        let loader = Arc::new(StaticLoader(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        StreamingClient::new(loader.clone(), loader)
    }

    #[core_async::test]
    async fn test_follows_master_to_first_variant() {
        let client = client(&[
            (
                "https://api/books/b1/m3u8",
                "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=64000\naudio/index.m3u8\n",
            ),
            ("https://api/books/b1/audio/index.m3u8", MEDIA),
        ]);

        let urls = client
            .fragment_urls(&Url::parse("https://api/books/b1/m3u8").unwrap())
            .await
            .unwrap();

        assert_eq!(
            urls,
            vec![
                "https://api/books/b1/audio/0.ts".to_string(),
                "https://api/books/b1/audio/1.ts".to_string(),
            ]
        );
    }

    #[core_async::test]
    async fn test_missing_manifest_is_load_error() {
        let client = client(&[]);
        let err = client
            .attach(
                &Url::parse("https://api/books/b1/m3u8").unwrap(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(404));
    }
}
