//! [`RemoteStore`] backed by the GitHub REST contents API.
//!
//! ```text
//! GET    /repos/{owner}/{repo}/contents/{path}?ref={branch}
//! PUT    /repos/{owner}/{repo}/contents/{path}   {message, content, branch, sha?}
//! DELETE /repos/{owner}/{repo}/contents/{path}   {message, sha, branch}
//! GET    /repos/{owner}/{repo}/git/blobs/{sha}   (files over 1 MiB)
//! ```
//!
//! The revision token is the blob sha GitHub returns for the file.

use std::time::Duration;

use base64::prelude::*;
use chrono::Local;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use foldermirror_core::{
    config::{self, MirrorConfig},
    types::{BranchName, PathIdentifier, RepoSlug},
};

use crate::error::SyncError;
use crate::remote::{RemoteError, RemoteFile, RemoteFileRef, RemoteStore, RevisionToken};

const USER_AGENT: &str = concat!("foldermirror/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct GithubStore {
    agent: ureq::Agent,
    api_base: Url,
    repository: RepoSlug,
    branch: BranchName,
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Entry(ContentEntry),
    Listing(Vec<serde_json::Value>),
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct MutationResponse {
    content: Option<MutatedContent>,
}

#[derive(Debug, Deserialize)]
struct MutatedContent {
    sha: String,
}

impl GithubStore {
    pub fn new(
        api_base: &str,
        repository: RepoSlug,
        branch: BranchName,
        token: impl Into<String>,
    ) -> Result<Self, SyncError> {
        let invalid = |reason: String| SyncError::InvalidApiBase {
            url: api_base.to_string(),
            reason,
        };
        let api_base = Url::parse(api_base).map_err(|e| invalid(e.to_string()))?;
        if api_base.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".to_string()));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build();
        Ok(Self {
            agent,
            api_base,
            repository,
            branch,
            token: token.into(),
        })
    }

    /// Build a store from the mirror config; the token comes from the env
    /// var the config names.
    pub fn from_config(cfg: &MirrorConfig) -> Result<Self, SyncError> {
        let token = config::resolve_token(cfg)?;
        Self::new(
            &cfg.api_base,
            cfg.repository.clone(),
            cfg.branch.clone(),
            token,
        )
    }

    /// `{api_base}/repos/{owner}/{name}/{tail...}`, each segment
    /// percent-encoded on its own.
    fn endpoint<'a>(&self, tail: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.api_base.clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend([
                    "repos",
                    self.repository.owner.as_str(),
                    self.repository.name.as_str(),
                ])
                .extend(tail);
        }
        url
    }

    fn contents_url(&self, path: &PathIdentifier) -> Url {
        self.endpoint(std::iter::once("contents").chain(path.as_str().split('/')))
    }

    fn blob_url(&self, sha: &str) -> Url {
        self.endpoint(["git", "blobs", sha])
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        self.agent
            .request_url(method, url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/vnd.github+json")
            .set("X-GitHub-Api-Version", API_VERSION)
    }

    fn fetch_blob(&self, path: &PathIdentifier, sha: &str) -> Result<Vec<u8>, RemoteError> {
        let blob: BlobResponse = self
            .request("GET", &self.blob_url(sha))
            .call()
            .map_err(|e| classify(path, e))?
            .into_json()
            .map_err(|e| RemoteError::Decode(format!("blob {sha}: {e}")))?;
        if blob.encoding != "base64" {
            return Err(RemoteError::Decode(format!(
                "blob {sha} has unsupported encoding '{}'",
                blob.encoding
            )));
        }
        decode_content(&blob.content)
    }

    fn put(
        &self,
        path: &PathIdentifier,
        content: &[u8],
        expected: Option<&RevisionToken>,
    ) -> Result<RevisionToken, RemoteError> {
        let verb = if expected.is_some() { "Update" } else { "Add" };
        let mut body = json!({
            "message": commit_message(verb, path),
            "content": BASE64_STANDARD.encode(content),
            "branch": self.branch.0,
        });
        if let Some(sha) = expected {
            body["sha"] = json!(sha.0);
        }

        let response: MutationResponse = self
            .request("PUT", &self.contents_url(path))
            .send_json(body)
            .map_err(|e| classify(path, e))?
            .into_json()
            .map_err(|e| RemoteError::Decode(format!("{path}: {e}")))?;
        response
            .content
            .map(|c| RevisionToken(c.sha))
            .ok_or_else(|| RemoteError::Decode(format!("{path}: response has no content sha")))
    }
}

impl RemoteStore for GithubStore {
    fn read(&self, path: &PathIdentifier) -> Result<Option<RemoteFile>, RemoteError> {
        let response = match self
            .request("GET", &self.contents_url(path))
            .query("ref", &self.branch.0)
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(err) => return Err(classify(path, err)),
        };

        let parsed: ContentsResponse = response
            .into_json()
            .map_err(|e| RemoteError::Decode(format!("{path}: {e}")))?;
        let entry = match parsed {
            // A directory lives at this path; there is no file to update or delete.
            ContentsResponse::Listing(_) => return Ok(None),
            ContentsResponse::Entry(entry) => entry,
        };
        if entry.kind != "file" {
            return Err(RemoteError::Decode(format!(
                "{path} is a {} on the remote, not a file",
                entry.kind
            )));
        }

        let content = match entry.encoding.as_str() {
            "base64" => decode_content(&entry.content)?,
            // Files over 1 MiB come back without inline content.
            "none" | "" => self.fetch_blob(path, &entry.sha)?,
            other => {
                return Err(RemoteError::Decode(format!(
                    "{path}: unsupported encoding '{other}'"
                )))
            }
        };

        Ok(Some(RemoteFile {
            reference: RemoteFileRef {
                path: path.clone(),
                revision: RevisionToken(entry.sha),
            },
            content,
        }))
    }

    fn create(&self, path: &PathIdentifier, content: &[u8]) -> Result<RevisionToken, RemoteError> {
        self.put(path, content, None)
    }

    fn update(
        &self,
        path: &PathIdentifier,
        content: &[u8],
        expected: &RevisionToken,
    ) -> Result<RevisionToken, RemoteError> {
        self.put(path, content, Some(expected))
    }

    fn delete(&self, path: &PathIdentifier, expected: &RevisionToken) -> Result<(), RemoteError> {
        let body = json!({
            "message": commit_message("Delete", path),
            "sha": expected.0,
            "branch": self.branch.0,
        });
        self.request("DELETE", &self.contents_url(path))
            .send_json(body)
            .map_err(|e| classify(path, e))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `Add notes/today.md - 2024-05-01 09:30:00`
fn commit_message(verb: &str, path: &PathIdentifier) -> String {
    format!("{verb} {path} - {}", Local::now().format("%Y-%m-%d %H:%M:%S"))
}

/// GitHub wraps base64 content at 60 columns.
fn decode_content(raw: &str) -> Result<Vec<u8>, RemoteError> {
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64_STANDARD
        .decode(compact)
        .map_err(|e| RemoteError::Decode(format!("base64 content: {e}")))
}

fn classify(path: &PathIdentifier, err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(404, _) => RemoteError::NotFound { path: path.clone() },
        // 409: sha does not match the branch head; 422: sha missing because
        // the file appeared since the lookup.
        ureq::Error::Status(409 | 422, _) => RemoteError::RevisionMismatch { path: path.clone() },
        ureq::Error::Status(status, response) => RemoteError::Api {
            status,
            message: api_message(response),
        },
        ureq::Error::Transport(transport) => RemoteError::Network(transport.to_string()),
    }
}

fn api_message(response: ureq::Response) -> String {
    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }
    let body = response.into_string().unwrap_or_default();
    serde_json::from_str::<ApiError>(&body)
        .map(|e| e.message)
        .unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn store() -> GithubStore {
        GithubStore::new(
            "https://api.example.test/",
            "octo/notes".parse().unwrap(),
            BranchName::from("main"),
            "t0ken",
        )
        .unwrap()
    }

    fn status(code: u16, body: &str) -> ureq::Error {
        ureq::Error::Status(code, ureq::Response::new(code, "status", body).unwrap())
    }

    #[test]
    fn contents_url_encodes_segments() {
        let path = PathIdentifier::parse("my docs/été #1?.md").unwrap();
        assert_eq!(
            store().contents_url(&path).as_str(),
            "https://api.example.test/repos/octo/notes/contents/my%20docs/%C3%A9t%C3%A9%20%231%3F.md"
        );
    }

    #[test]
    fn api_base_with_path_prefix_is_kept() {
        let store = GithubStore::new(
            "https://ghe.example.test/api/v3",
            "octo/notes".parse().unwrap(),
            BranchName::from("main"),
            "t0ken",
        )
        .unwrap();
        assert_eq!(
            store.blob_url("abc123").as_str(),
            "https://ghe.example.test/api/v3/repos/octo/notes/git/blobs/abc123"
        );
    }

    #[rstest]
    #[case("not a url")]
    #[case("mailto:someone@example.test")]
    fn unusable_api_base_is_rejected(#[case] base: &str) {
        let err = GithubStore::new(base, "octo/notes".parse().unwrap(), BranchName::from("main"), "t")
            .err()
            .expect("invalid base");
        assert!(matches!(err, SyncError::InvalidApiBase { .. }));
    }

    #[test]
    fn wrapped_base64_decodes() {
        let wrapped = "aGVsbG8g\nd29ybGQ=\n";
        assert_eq!(decode_content(wrapped).unwrap(), b"hello world");
    }

    #[test]
    fn commit_message_names_the_path() {
        let msg = commit_message("Update", &PathIdentifier::parse("a/b.txt").unwrap());
        assert!(msg.starts_with("Update a/b.txt - "), "got: {msg}");
    }

    #[rstest]
    #[case(404, "{}")]
    #[case(409, "{\"message\":\"is at abc but expected def\"}")]
    #[case(422, "{\"message\":\"sha wasn't supplied\"}")]
    #[case(500, "{\"message\":\"boom\"}")]
    fn status_codes_map_to_remote_errors(#[case] code: u16, #[case] body: &str) {
        let path = PathIdentifier::parse("x.txt").unwrap();
        let err = classify(&path, status(code, body));
        match code {
            404 => assert!(matches!(err, RemoteError::NotFound { .. })),
            409 | 422 => assert!(matches!(err, RemoteError::RevisionMismatch { .. })),
            _ => assert_eq!(
                err,
                RemoteError::Api { status: 500, message: "boom".to_string() }
            ),
        }
    }

    #[test]
    fn directory_listing_parses_as_listing() {
        let parsed: ContentsResponse = serde_json::from_str(r#"[{"type":"file"}]"#).unwrap();
        assert!(matches!(parsed, ContentsResponse::Listing(_)));

        let parsed: ContentsResponse = serde_json::from_str(
            r#"{"type":"file","sha":"abc","content":"aGk=\n","encoding":"base64"}"#,
        )
        .unwrap();
        match parsed {
            ContentsResponse::Entry(entry) => {
                assert_eq!(entry.sha, "abc");
                assert_eq!(decode_content(&entry.content).unwrap(), b"hi");
            }
            ContentsResponse::Listing(_) => panic!("expected a file entry"),
        }
    }
}
