/*!
SOURCES DE DONNÉES - Récupération du flux et de la base des bâtiments

RÔLE :
Abstraction des deux ressources lues à chaque cycle : le flux de statut (texte)
et la base SQLite des bâtiments (binaire). Une ressource est une URL http(s)
ou un chemin local.

FONCTIONNEMENT :
- Trait `StatusSource` : seul point de suspension d'un cycle
- `ResourceSource` : implémentation réelle (reqwest pour les URL, tokio::fs sinon)
- Un échec de récupération est une FetchError distincte, jamais un contenu vide
*/

use crate::config::KernelConfig;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid resource '{resource}': {reason}")]
    InvalidResource { resource: String, reason: String },
    #[error("cannot read {resource}: {source}")]
    Io {
        resource: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request to {resource} failed: {source}")]
    Http {
        resource: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{resource} answered HTTP {status}")]
    Status { resource: String, status: u16 },
    #[error("cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_feed(&self) -> Result<Vec<u8>, FetchError>;
    async fn fetch_metadata(&self) -> Result<Vec<u8>, FetchError>;
}

/// Identifiant de ressource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Url(reqwest::Url),
    Path(PathBuf),
}

impl Resource {
    pub fn parse(identifier: &str) -> Result<Self, FetchError> {
        let trimmed = identifier.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            reqwest::Url::parse(trimmed)
                .map(Resource::Url)
                .map_err(|e| FetchError::InvalidResource {
                    resource: trimmed.to_string(),
                    reason: e.to_string(),
                })
        } else if trimmed.is_empty() {
            Err(FetchError::InvalidResource {
                resource: String::new(),
                reason: "empty identifier".into(),
            })
        } else {
            Ok(Resource::Path(PathBuf::from(trimmed)))
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Url(url) => write!(f, "{url}"),
            Resource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

pub struct ResourceSource {
    client: reqwest::Client,
    feed: Resource,
    metadata: Resource,
}

impl ResourceSource {
    pub fn from_config(cfg: &KernelConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.fetch_timeout())
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            feed: Resource::parse(&cfg.feed)?,
            metadata: Resource::parse(&cfg.metadata)?,
        })
    }

    async fn fetch(&self, resource: &Resource) -> Result<Vec<u8>, FetchError> {
        let bytes = match resource {
            Resource::Path(path) => tokio::fs::read(path).await.map_err(|source| FetchError::Io {
                resource: resource.to_string(),
                source,
            })?,
            Resource::Url(url) => {
                let http_err = |source| FetchError::Http { resource: resource.to_string(), source };
                let resp = self.client.get(url.clone()).send().await.map_err(http_err)?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(FetchError::Status {
                        resource: resource.to_string(),
                        status: status.as_u16(),
                    });
                }
                resp.bytes().await.map_err(http_err)?.to_vec()
            }
        };
        debug!("[source] fetched {} bytes from {resource}", bytes.len());
        Ok(bytes)
    }
}

#[async_trait]
impl StatusSource for ResourceSource {
    async fn fetch_feed(&self) -> Result<Vec<u8>, FetchError> {
        self.fetch(&self.feed).await
    }

    async fn fetch_metadata(&self) -> Result<Vec<u8>, FetchError> {
        self.fetch(&self.metadata).await
    }
}
