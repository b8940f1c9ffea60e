use std::fs;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::error::RepositoryError;
use crate::library::{LibraryIdentity, LibraryStatus};
use crate::repository::{RepositoryClient, RepositoryItem};

const USER_HEADER: &str = "X-Repository-User";

/// Blocking JSON-over-HTTP repository transport.
///
/// Every endpoint lives under the base URL and addresses items through the
/// `ns`, `filename`, and `version` query parameters. Mutating calls also send the
/// mirrored `revision` so the server can reject stale writes with `409`.
pub struct HttpRepository {
    id: String,
    base: Url,
    user: String,
}

#[derive(Deserialize)]
struct PermissionResponse {
    write: bool,
}

impl HttpRepository {
    pub fn new(id: impl Into<String>, base: Url, user: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base,
            user: user.into(),
        }
    }

    fn endpoint(
        &self,
        name: &str,
        identity: Option<&LibraryIdentity>,
        extra: &[(&str, String)],
    ) -> Result<Url, RepositoryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RepositoryError::Transport(format!("{} cannot be a base url", self.base)))?
            .pop_if_empty()
            .push(name);
        {
            let mut query = url.query_pairs_mut();
            if let Some(identity) = identity {
                query
                    .append_pair("ns", &identity.namespace)
                    .append_pair("filename", &identity.filename)
                    .append_pair("version", &identity.version);
            }
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn call(
        &self,
        method: &str,
        url: &Url,
        identity: Option<&LibraryIdentity>,
        body: Option<String>,
    ) -> Result<String, RepositoryError> {
        let request = ureq::request(method, url.as_str()).set(USER_HEADER, &self.user);
        let result = match body {
            Some(body) => request.send_string(&body),
            None => request.call(),
        };
        match result {
            Ok(response) => response
                .into_string()
                .map_err(|err| RepositoryError::Transport(format!("reading {url}: {err}"))),
            Err(ureq::Error::Status(code, response)) => {
                let message = response
                    .into_string()
                    .unwrap_or_else(|_| String::from("no response body"));
                Err(self.status_error(code, identity, message))
            }
            Err(ureq::Error::Transport(transport)) => Err(RepositoryError::Unreachable {
                repository: self.id.clone(),
                message: transport.to_string(),
            }),
        }
    }

    fn status_error(
        &self,
        code: u16,
        identity: Option<&LibraryIdentity>,
        message: String,
    ) -> RepositoryError {
        match (code, identity) {
            (404, Some(identity)) => RepositoryError::NotFound {
                repository: self.id.clone(),
                identity: identity.clone(),
            },
            (401 | 403, identity) => RepositoryError::PermissionDenied {
                repository: self.id.clone(),
                namespace: identity
                    .map(|identity| identity.namespace.clone())
                    .unwrap_or_default(),
            },
            (409, Some(identity)) => RepositoryError::Conflict {
                identity: identity.clone(),
                message,
            },
            (code, _) if code >= 500 => RepositoryError::Unreachable {
                repository: self.id.clone(),
                message: format!("{code}: {message}"),
            },
            (code, _) => RepositoryError::Transport(format!("{code}: {message}")),
        }
    }

    fn item_call(
        &self,
        method: &str,
        name: &str,
        item: &RepositoryItem,
        extra: &[(&str, String)],
        body: Option<String>,
    ) -> Result<RepositoryItem, RepositoryError> {
        let mut params = vec![("revision", item.revision.to_string())];
        params.extend_from_slice(extra);
        let url = self.endpoint(name, Some(&item.identity), &params)?;
        let text = self.call(method, &url, Some(&item.identity), body)?;
        parse_item(&text)
    }
}

fn parse_item(text: &str) -> Result<RepositoryItem, RepositoryError> {
    serde_json::from_str(text)
        .map_err(|err| RepositoryError::Transport(format!("invalid item metadata: {err}")))
}

impl RepositoryClient for HttpRepository {
    fn id(&self) -> &str {
        &self.id
    }

    fn location(&self) -> String {
        self.base.to_string()
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn item(&self, identity: &LibraryIdentity) -> Result<RepositoryItem, RepositoryError> {
        let url = self.endpoint("items", Some(identity), &[])?;
        parse_item(&self.call("GET", &url, Some(identity), None)?)
    }

    fn download(&self, item: &RepositoryItem) -> Result<String, RepositoryError> {
        let url = self.endpoint("content", Some(&item.identity), &[])?;
        self.call("GET", &url, Some(&item.identity), None)
    }

    fn can_write(&self, namespace: &str) -> Result<bool, RepositoryError> {
        let url = self.endpoint("permissions", None, &[("ns", namespace.to_string())])?;
        let text = self.call("GET", &url, None, None)?;
        let response: PermissionResponse = serde_json::from_str(&text)
            .map_err(|err| RepositoryError::Transport(format!("invalid permissions: {err}")))?;
        Ok(response.write)
    }

    fn publish(
        &self,
        content: &Path,
        identity: &LibraryIdentity,
        status: LibraryStatus,
    ) -> Result<RepositoryItem, RepositoryError> {
        let body = fs::read_to_string(content)?;
        let url = self.endpoint(
            "publish",
            Some(identity),
            &[("status", status.as_str().to_string())],
        )?;
        parse_item(&self.call("POST", &url, Some(identity), Some(body))?)
    }

    fn lock(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError> {
        self.item_call("POST", "lock", item, &[], None)
    }

    fn unlock(
        &self,
        item: &RepositoryItem,
        commit: Option<&Path>,
    ) -> Result<RepositoryItem, RepositoryError> {
        let body = commit.map(fs::read_to_string).transpose()?;
        let flag = ("commit", body.is_some().to_string());
        self.item_call("POST", "unlock", item, &[flag], body)
    }

    fn commit(
        &self,
        item: &RepositoryItem,
        content: &Path,
    ) -> Result<RepositoryItem, RepositoryError> {
        let body = fs::read_to_string(content)?;
        self.item_call("POST", "commit", item, &[], Some(body))
    }

    fn revert(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError> {
        self.item_call("POST", "revert", item, &[], None)
    }

    fn promote(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError> {
        self.item_call("POST", "promote", item, &[], None)
    }

    fn demote(&self, item: &RepositoryItem) -> Result<RepositoryItem, RepositoryError> {
        self.item_call("POST", "demote", item, &[], None)
    }

    fn delete(&self, item: &RepositoryItem) -> Result<(), RepositoryError> {
        let url = self.endpoint(
            "items",
            Some(&item.identity),
            &[("revision", item.revision.to_string())],
        )?;
        self.call("DELETE", &url, Some(&item.identity), None)?;
        Ok(())
    }
}
