use crate::{ClientError, error_from_response};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: u32 = 100;

/// Coordinates of a pull request on the code host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl PrRef {
    /// Parses `https://host/{owner}/{repo}/pull/{number}` style URLs.
    pub fn parse(url: &str) -> Result<Self, ClientError> {
        let trimmed = url.trim_end_matches('/');
        let without_scheme = trimmed
            .split_once("://")
            .map_or(trimmed, |(_, rest)| rest);
        let mut segments = without_scheme.split('/');
        let _host = segments.next();
        let owner = segments.next();
        let repo = segments.next();
        let kind = segments.next();
        let number = segments.next();
        match (owner, repo, kind, number, segments.next()) {
            (Some(owner), Some(repo), Some("pull" | "pulls"), Some(number), None) => {
                let number = number.parse().map_err(|_| ClientError::Decode {
                    message: format!("invalid pull request number in url: {url}"),
                })?;
                Ok(Self {
                    owner: owner.to_string(),
                    repo: repo.trim_end_matches(".git").to_string(),
                    number,
                })
            }
            _ => Err(ClientError::Decode {
                message: format!("unrecognized pull request url: {url}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReviewSummary {
    pub id: u64,
    pub reviewer: String,
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReviewerComment {
    pub id: u64,
    pub author: String,
    pub body: String,
}

#[async_trait]
pub trait CodeHost: Send + Sync {
    /// Flips a draft PR to ready. No-op when the PR is already ready.
    async fn mark_ready_for_review(&self, pr: &PrRef) -> Result<(), ClientError>;
    async fn request_reviewer(&self, pr: &PrRef, reviewer: &str) -> Result<(), ClientError>;
    async fn post_comment(&self, pr: &PrRef, body: &str) -> Result<(), ClientError>;
    async fn list_reviews(&self, pr: &PrRef) -> Result<Vec<ReviewSummary>, ClientError>;
    async fn list_review_comments(&self, pr: &PrRef)
    -> Result<Vec<ReviewerComment>, ClientError>;
    /// Looks up an open PR whose head branch matches. Returns the PR URL.
    async fn find_pr_by_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<String>, ClientError>;
}

pub struct HttpCodeHost {
    client: Client,
    api_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct WireReview {
    id: u64,
    user: WireUser,
    state: String,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireComment {
    id: u64,
    user: WireUser,
    body: String,
}

#[derive(Debug, Deserialize)]
struct WirePull {
    html_url: String,
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    draft: bool,
}

impl HttpCodeHost {
    pub fn new(api_base: String, token: String) -> Result<Self, ClientError> {
        if token.trim().is_empty() {
            return Err(ClientError::Unavailable);
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent("foreman")
            .build()
            .map_err(ClientError::from)?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn pulls_url(&self, pr: &PrRef, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/pulls/{}{suffix}",
            self.api_base, pr.owner, pr.repo, pr.number
        )
    }

    async fn get_pull(&self, pr: &PrRef) -> Result<WirePull, ClientError> {
        let response = self
            .client
            .get(self.pulls_url(pr, ""))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    async fn fetch_pages<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Vec<T>, ClientError> {
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let response = self
                .client
                .get(url)
                .bearer_auth(&self.token)
                .query(&[("per_page", PAGE_SIZE), ("page", page)])
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }
            let batch: Vec<T> = response.json().await?;
            let done = (batch.len() as u32) < PAGE_SIZE;
            all.extend(batch);
            if done {
                return Ok(all);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl CodeHost for HttpCodeHost {
    async fn mark_ready_for_review(&self, pr: &PrRef) -> Result<(), ClientError> {
        let pull = self.get_pull(pr).await?;
        if !pull.draft {
            return Ok(());
        }
        // The REST draft field is not writable everywhere; fall back to the
        // GraphQL mutation when the PATCH is rejected.
        let response = self
            .client
            .patch(self.pulls_url(pr, ""))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "draft": false }))
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        let Some(node_id) = pull.node_id else {
            return Err(error_from_response(response).await);
        };
        let mutation = serde_json::json!({
            "query": "mutation($id: ID!) { markPullRequestReadyForReview(input: { pullRequestId: $id }) { clientMutationId } }",
            "variables": { "id": node_id },
        });
        let response = self
            .client
            .post(format!("{}/graphql", self.api_base))
            .bearer_auth(&self.token)
            .json(&mutation)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    async fn request_reviewer(&self, pr: &PrRef, reviewer: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.pulls_url(pr, "/requested_reviewers"))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "reviewers": [reviewer] }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    async fn post_comment(&self, pr: &PrRef, body: &str) -> Result<(), ClientError> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_base, pr.owner, pr.repo, pr.number
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    async fn list_reviews(&self, pr: &PrRef) -> Result<Vec<ReviewSummary>, ClientError> {
        let reviews: Vec<WireReview> = self.fetch_pages(&self.pulls_url(pr, "/reviews")).await?;
        Ok(reviews
            .into_iter()
            .map(|review| ReviewSummary {
                id: review.id,
                reviewer: review.user.login,
                state: review.state,
                body: review.body,
            })
            .collect())
    }

    async fn list_review_comments(
        &self,
        pr: &PrRef,
    ) -> Result<Vec<ReviewerComment>, ClientError> {
        let comments: Vec<WireComment> =
            self.fetch_pages(&self.pulls_url(pr, "/comments")).await?;
        Ok(comments
            .into_iter()
            .map(|comment| ReviewerComment {
                id: comment.id,
                author: comment.user.login,
                body: comment.body,
            })
            .collect())
    }

    async fn find_pr_by_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<String>, ClientError> {
        let url = format!("{}/repos/{owner}/{repo}/pulls", self.api_base);
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(&[
                ("state", "open"),
                ("head", &format!("{owner}:{branch}")),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let pulls: Vec<WirePull> = response.json().await?;
        Ok(pulls.into_iter().next().map(|pull| pull.html_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_pull_url() {
        let pr = PrRef::parse("https://github.com/acme/widgets/pull/42").unwrap();
        assert_eq!(pr.owner, "acme");
        assert_eq!(pr.repo, "widgets");
        assert_eq!(pr.number, 42);
    }

    #[test]
    fn parses_trailing_slash_and_enterprise_host() {
        let pr = PrRef::parse("https://git.corp.example/acme/widgets/pull/7/").unwrap();
        assert_eq!(pr.number, 7);
    }

    #[test]
    fn rejects_non_pull_urls() {
        assert!(PrRef::parse("https://github.com/acme/widgets").is_err());
        assert!(PrRef::parse("https://github.com/acme/widgets/issues/3").is_err());
        assert!(PrRef::parse("https://github.com/acme/widgets/pull/notanumber").is_err());
    }

    #[test]
    fn blank_token_is_unavailable_without_a_request() {
        let err = HttpCodeHost::new("https://api.github.com".to_string(), String::new());
        assert!(matches!(err, Err(ClientError::Unavailable)));
    }
}
