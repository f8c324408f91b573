//! reqwest-backed [`ResourceClient`] for the RQM integration service.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{
    HeaderMap, ACCEPT, CONTENT_LOCATION, CONTENT_TYPE, LOCATION, SET_COOKIE,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use rqm_state::{
    fields, ClientError, ClientResult, Payload, RemoteResource, ResourceClient, ResourceFilter,
    ResourceId, ResourceType,
};
use tracing::{debug, info, instrument};

use crate::config::RqmConfig;
use crate::error::{Result, RqmError};
use crate::xml::{self, XmlElement};

const INTEGRATION_SERVICE: &str =
    "qm/service/com.ibm.rqm.integration.service.IIntegrationService/resources";
const AUTH_MSG_HEADER: &str = "X-com-ibm-team-repository-web-auth-msg";
const CSRF_HEADER: &str = "X-Jazz-CSRF-Prevent";
const SESSION_COOKIE: &str = "JSESSIONID";

/// Authenticated session against one RQM project.
pub struct RqmClient {
    http: reqwest::Client,
    config: RqmConfig,
    /// Project area UUID, used in every integration URL.
    project_id: String,
    csrf_token: String,
}

impl RqmClient {
    /// Log in, resolve the project and capture the session token.
    #[instrument(skip(config), fields(host = %config.host, project = %config.project))]
    pub async fn connect(config: RqmConfig) -> Result<Self> {
        let qm_root = Url::parse(&format!("{}/qm/", config.host))
            .map_err(|_| RqmError::InvalidHost(config.host.clone()))?;
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        let login = http
            .post(format!("{}/qm/j_security_check", config.host))
            .form(&[
                ("j_username", config.user.as_str()),
                ("j_password", config.password.as_str()),
            ])
            .send()
            .await
            .map_err(transport)?;
        if auth_rejected(&login) {
            return Err(ClientError::Authentication(format!(
                "login rejected for user '{}'",
                config.user
            ))
            .into());
        }
        if !(login.status().is_success() || login.status().is_redirection()) {
            return Err(remote_error(login).await.into());
        }

        let csrf_token = session_from_headers(login.headers())
            .or_else(|| {
                jar.cookies(&qm_root)
                    .and_then(|v| v.to_str().ok().and_then(session_from_cookie_header))
            })
            .ok_or(RqmError::MissingSession)?;

        let project_id = resolve_project(&http, &config).await?;
        info!(project_id = %project_id, user = %config.user, "connected to RQM");

        Ok(Self {
            http,
            config,
            project_id,
            csrf_token,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// `<host>/qm/service/.../resources/<project>/<type>[/<id>]`.
    ///
    /// Numeric ids are internal web ids and use the `urn:com.ibm.rqm:` form.
    pub fn integration_url(&self, resource_type: ResourceType, id: Option<&ResourceId>) -> String {
        let kind = resource_type.remote_name();
        let mut url = format!(
            "{}/{INTEGRATION_SERVICE}/{}/{kind}",
            self.config.host, self.project_id
        );
        if let Some(id) = id {
            let id = id.as_str();
            if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
                url.push_str(&format!("/urn:com.ibm.rqm:{kind}:{id}"));
            } else {
                url.push('/');
                url.push_str(id);
            }
        }
        url
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(ACCEPT, "application/xml")
            .header(CONTENT_TYPE, "application/rdf+xml")
            .header(CSRF_HEADER, self.csrf_token.as_str())
            .header("OSLC-Core-Version", "2.0")
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let response = request.send().await.map_err(transport)?;
        debug!(url = %response.url(), status = %response.status(), "rqm response");
        if auth_rejected(&response) {
            return Err(ClientError::Authentication(
                "session rejected by server".to_string(),
            ));
        }
        Ok(response)
    }

    /// GET a document; `None` on 404.
    async fn fetch(&self, url: &str) -> ClientResult<Option<String>> {
        let response = self.send(self.request(Method::GET, url)).await?;
        match response.status() {
            s if s.is_success() => Ok(Some(response.text().await.map_err(transport)?)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(remote_error(response).await),
        }
    }

    /// Every entry of a feed, following `rel="next"` links.
    async fn fetch_feed(
        &self,
        resource_type: ResourceType,
        first_page: RequestBuilder,
    ) -> ClientResult<Vec<RemoteResource>> {
        let mut resources = Vec::new();
        let mut seen = HashSet::new();
        let mut request = first_page;
        loop {
            let response = self.send(request).await?;
            if !response.status().is_success() {
                return Err(remote_error(response).await);
            }
            let feed = xml::parse_feed(&response.text().await.map_err(transport)?)?;
            resources.extend(feed.entries.into_iter().map(|e| e.into_resource(resource_type)));

            match feed.next {
                Some(next) if seen.insert(next.clone()) => {
                    request = self.request(Method::GET, &next);
                }
                _ => break,
            }
        }
        Ok(resources)
    }

    async fn team_areas(&self) -> ClientResult<Vec<RemoteResource>> {
        let url = format!(
            "{}/qm/process/project-areas/{}/team-areas",
            self.config.host, self.project_id
        );
        let body = self.fetch(&url).await?.ok_or_else(|| {
            ClientError::remote(format!(
                "could not get team areas of project '{}'",
                self.config.project
            ))
        })?;
        Ok(xml::parse_process_areas(&body, "team-area")?
            .into_iter()
            .map(|(name, url)| {
                RemoteResource::new(ResourceType::TeamArea, xml::last_segment(&url))
                    .with_field(fields::TITLE, name)
                    .with_field(fields::URL, url)
            })
            .collect())
    }

    /// Resolve the id in a `Content-Location` to the resource's web id.
    async fn web_id(&self, resource_type: ResourceType, location: &str) -> ClientResult<ResourceId> {
        let generated = xml::id_from_url(location);
        if generated.as_str().chars().all(|c| c.is_ascii_digit()) {
            return Ok(generated);
        }
        let url = self.integration_url(resource_type, Some(&generated));
        match self.fetch(&url).await? {
            Some(body) => Ok(XmlElement::parse(&body)?
                .child_text("webId")
                .map(ResourceId::from)
                .unwrap_or(generated)),
            None => Err(ClientError::InvalidResponse(format!(
                "created {resource_type} '{generated}' cannot be read back"
            ))),
        }
    }

    /// Current document with the payload's test case links appended.
    /// Current remote document with the payload's field changes merged in.
    ///
    /// Test cases get their patched fields rewritten in place; other
    /// resources get missing test case links appended. `None` means the
    /// document already matches.
    async fn patched_document(
        &self,
        resource_type: ResourceType,
        id: &ResourceId,
        payload: &Payload,
    ) -> ClientResult<Option<String>> {
        if resource_type == ResourceType::TestCase {
            let patch = xml::TestCasePatch::from_fields(&payload.fields);
            if patch.is_empty() {
                return Err(ClientError::MissingDocument(resource_type));
            }
            let current = self.current_document(resource_type, id).await?;
            return xml::patch_testcase(&current, &patch).map(Some);
        }

        let wanted = RemoteResource {
            resource_type,
            id: id.clone(),
            fields: payload.fields.clone(),
        }
        .field_ids(fields::TESTCASE);
        if wanted.is_empty() {
            return Err(ClientError::MissingDocument(resource_type));
        }

        let current = self.current_document(resource_type, id).await?;
        let urls: Vec<String> = wanted
            .iter()
            .map(|tc| self.integration_url(ResourceType::TestCase, Some(tc)))
            .collect();
        xml::append_testcase_links(&current, &urls)
    }

    async fn current_document(&self, resource_type: ResourceType, id: &ResourceId) -> ClientResult<String> {
        let url = self.integration_url(resource_type, Some(id));
        self.fetch(&url).await?.ok_or_else(|| ClientError::NotFound {
            resource_type,
            id: id.clone(),
        })
    }
}

#[async_trait]
impl ResourceClient for RqmClient {
    #[instrument(skip_all, fields(resource = %resource_type, id = %id))]
    async fn get(&self, resource_type: ResourceType, id: &ResourceId) -> ClientResult<RemoteResource> {
        let url = self.integration_url(resource_type, Some(id));
        let body = self.fetch(&url).await?.ok_or_else(|| ClientError::NotFound {
            resource_type,
            id: id.clone(),
        })?;
        let root = XmlElement::parse(&body)?;
        Ok(xml::resource_from_element(resource_type, &root, Some(id.as_str())))
    }

    #[instrument(skip_all, fields(resource = %resource_type, filter = %filter))]
    async fn query(
        &self,
        resource_type: ResourceType,
        filter: &ResourceFilter,
    ) -> ClientResult<Vec<RemoteResource>> {
        let candidates = match (resource_type, filter) {
            (ResourceType::TeamArea, _) => self.team_areas().await?,
            (_, ResourceFilter::ExecutionRecordFor { testcase, testplan }) => {
                let tc = self.integration_url(ResourceType::TestCase, Some(testcase));
                let tp = self.integration_url(ResourceType::TestPlan, Some(testplan));
                let selector = format!(
                    "feed/entry/content/executionworkitem[testcase/@href='{tc}' and testplan/@href='{tp}']/(webId|title|testcase|testplan)"
                );
                let url = self.integration_url(resource_type, None);
                let first = self
                    .request(Method::GET, &url)
                    .query(&[("fields", selector.as_str())]);
                self.fetch_feed(resource_type, first).await?
            }
            _ => {
                let url = self.integration_url(resource_type, None);
                let first = self.request(Method::GET, &url);
                self.fetch_feed(resource_type, first).await?
            }
        };
        Ok(candidates.into_iter().filter(|r| filter.matches(r)).collect())
    }

    #[instrument(skip_all, fields(resource = %resource_type))]
    async fn create(&self, resource_type: ResourceType, payload: Payload) -> ClientResult<ResourceId> {
        let document = payload
            .document
            .ok_or(ClientError::MissingDocument(resource_type))?;
        let url = self.integration_url(resource_type, None);
        let response = self
            .send(self.request(Method::POST, &url).body(document))
            .await?;

        let status = response.status();
        let location = location(response.headers());
        match status {
            StatusCode::CREATED => {
                let body = response.text().await.map_err(transport)?;
                if let Some(id) = id_in_body(&body, &["resultId", "webId"]) {
                    return Ok(id);
                }
                match location {
                    Some(location) => self.web_id(resource_type, &location).await,
                    None => Err(ClientError::InvalidResponse(format!(
                        "{resource_type} created without an id"
                    ))),
                }
            }
            // Already exists: the service points at the existing resource.
            StatusCode::SEE_OTHER => location
                .map(|l| xml::id_from_url(&l))
                .ok_or_else(|| ClientError::InvalidResponse("303 without location".to_string())),
            StatusCode::OK => {
                let body = response.text().await.map_err(transport)?;
                id_in_body(&body, &["webId"]).ok_or_else(|| {
                    ClientError::InvalidResponse(format!(
                        "{resource_type} exists but response carries no webId"
                    ))
                })
            }
            _ => Err(remote_error(response).await),
        }
    }

    #[instrument(skip_all, fields(resource = %resource_type, id = %id))]
    async fn update(
        &self,
        resource_type: ResourceType,
        id: &ResourceId,
        payload: Payload,
    ) -> ClientResult<()> {
        let document = match payload.document.clone() {
            Some(document) => document,
            None => match self.patched_document(resource_type, id, &payload).await? {
                Some(document) => document,
                None => return Ok(()),
            },
        };

        let url = self.integration_url(resource_type, Some(id));
        let response = self
            .send(self.request(Method::PUT, &url).body(document))
            .await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound {
                resource_type,
                id: id.clone(),
            }),
            _ => Err(remote_error(response).await),
        }
    }

    fn authenticated_user(&self) -> &str {
        &self.config.user
    }

    fn resource_uri(&self, resource_type: ResourceType, id: &ResourceId) -> String {
        self.integration_url(resource_type, Some(id))
    }

    fn user_uri(&self, user: &str) -> String {
        format!(
            "{}/jts/resource/itemName/com.ibm.team.repository.Contributor/{user}",
            self.config.host
        )
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn resolve_project(http: &reqwest::Client, config: &RqmConfig) -> Result<String> {
    let response = http
        .get(format!("{}/qm/process/project-areas", config.host))
        .header(ACCEPT, "application/xml")
        .send()
        .await
        .map_err(transport)?;
    if auth_rejected(&response) {
        return Err(ClientError::Authentication(format!(
            "user '{}' may not list project areas",
            config.user
        ))
        .into());
    }
    if !response.status().is_success() {
        return Err(remote_error(response).await.into());
    }

    let body = response.text().await.map_err(transport)?;
    xml::parse_process_areas(&body, "project-area")?
        .into_iter()
        .find(|(name, _)| *name == config.project)
        .map(|(_, url)| xml::last_segment(&url).to_string())
        .ok_or_else(|| RqmError::ProjectNotFound(config.project.clone()))
}

fn auth_rejected(response: &Response) -> bool {
    if response.status() == StatusCode::UNAUTHORIZED {
        return true;
    }
    response
        .headers()
        .get(AUTH_MSG_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("authfailed") || v.eq_ignore_ascii_case("authrequired"))
        .unwrap_or(false)
}

fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(session_from_cookie_header)
}

/// `JSESSIONID` value from a `Cookie` or `Set-Cookie` header value.
fn session_from_cookie_header(value: &str) -> Option<String> {
    value.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

fn location(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_LOCATION)
        .or_else(|| headers.get(LOCATION))
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn id_in_body(body: &str, elements: &[&str]) -> Option<ResourceId> {
    if body.trim().is_empty() {
        return None;
    }
    let root = XmlElement::parse(body).ok()?;
    elements.iter().find_map(|name| {
        root.find(name)
            .map(|el| el.text.trim())
            .filter(|t| !t.is_empty())
            .map(ResourceId::from)
    })
}

fn transport(err: reqwest::Error) -> ClientError {
    ClientError::Transport(err.to_string())
}

async fn remote_error(response: Response) -> ClientError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = body.trim();
    let reason = status.canonical_reason().unwrap_or("unexpected status");
    let message = if detail.is_empty() {
        reason.to_string()
    } else {
        format!("{reason}: {}", detail.chars().take(200).collect::<String>())
    };
    ClientError::Remote {
        status: Some(status.as_u16()),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_parsing() {
        assert_eq!(
            session_from_cookie_header("JSESSIONID=abc123; Path=/qm; Secure").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            session_from_cookie_header("LtpaToken2=x; JSESSIONID=def").as_deref(),
            Some("def")
        );
        assert_eq!(session_from_cookie_header("JSESSIONID=; Path=/"), None);
    }

    #[test]
    fn test_id_in_body() {
        let body = r#"<rqm:results xmlns:rqm="http://schema.ibm.com/rqm/2007#results"><rqm:resultId>301</rqm:resultId></rqm:results>"#;
        assert_eq!(id_in_body(body, &["resultId", "webId"]), Some(ResourceId::from("301")));
        assert_eq!(id_in_body("", &["webId"]), None);
        assert_eq!(id_in_body("not xml <", &["webId"]), None);
    }
}
