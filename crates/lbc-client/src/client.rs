use crate::cache::{cache_key, CacheEntry, SubmissionCache, STATUS_PENDING};
use crate::config::DEFAULT_CHALLENGE_ID;
use crate::policy::{poll_until, PollPolicy, RetryPolicy};
use lbc_core::codec::encode_submission;
use lbc_core::models::{experiment_id_of, parse_experiment_list, parse_leaderboard};
use lbc_core::{
    Error, ExperimentStatus, ExperimentSummary, JobStatus, LeaderboardEntry, Result,
    SubmissionResult, TargetImage, Trace,
};
use reqwest::blocking::RequestBuilder;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub base_url: String,
    pub api_key: String,
    pub challenge_id: String,
    pub request_timeout: Duration,
    pub poll: PollPolicy,
    pub retry: RetryPolicy,
    pub cache_dir: Option<PathBuf>,
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            challenge_id: DEFAULT_CHALLENGE_ID.to_string(),
            request_timeout: Duration::from_secs(30),
            poll: PollPolicy::default(),
            retry: RetryPolicy::default(),
            cache_dir: None,
        }
    }

    pub fn with_challenge_id(mut self, challenge_id: impl Into<String>) -> Self {
        self.challenge_id = challenge_id.into();
        self
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}

/// Anything `submit` can turn into a trace: a finished [`Trace`] or a
/// routine to run under the tracer.
pub trait TraceSource {
    fn into_trace(self) -> Result<Trace>;
}

impl TraceSource for Trace {
    fn into_trace(self) -> Result<Trace> {
        Ok(self)
    }
}

impl<F> TraceSource for F
where
    F: FnOnce() -> Result<()>,
{
    fn into_trace(self) -> Result<Trace> {
        lbc_core::trace(self)
    }
}

/// Blocking client for the submission service.
///
/// The HTTP connection pool is acquired in [`Client::new`] and released by
/// [`Client::close`] or on drop, whichever comes first. One client drives one
/// submission at a time; share it across threads only behind a lock.
pub struct Client {
    http: Option<reqwest::blocking::Client>,
    base_url: String,
    options: ClientOptions,
    cache: Option<SubmissionCache>,
}

impl Client {
    pub fn new(options: ClientOptions) -> Result<Self> {
        let base_url = options.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() || options.api_key.trim().is_empty() {
            return Err(Error::Config(
                "missing credentials: both api_key and base_url are required".to_string(),
            ));
        }
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", options.api_key.trim()))
            .map_err(|_| Error::Config("api key is not a valid header value".to_string()))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        let http = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| Error::Transport(format!("could not build HTTP client: {}", e)))?;
        let cache = options.cache_dir.clone().map(SubmissionCache::new);
        debug!(base_url = %base_url, challenge_id = %options.challenge_id, "client opened");
        Ok(Self {
            http: Some(http),
            base_url,
            options,
            cache,
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn challenge_id(&self) -> &str {
        &self.options.challenge_id
    }

    pub fn is_closed(&self) -> bool {
        self.http.is_none()
    }

    /// Releases the connection pool. Repeated calls are no-ops.
    pub fn close(&mut self) {
        if self.http.take().is_some() {
            debug!(base_url = %self.base_url, "client closed");
        }
    }

    fn http(&self) -> Result<&reqwest::blocking::Client> {
        self.http
            .as_ref()
            .ok_or_else(|| Error::state("client has been closed"))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get_json(&self, path: &str) -> Result<Value> {
        let http = self.http()?;
        let url = self.url(path);
        self.options
            .retry
            .run(&format!("GET {}", path), || execute(http.get(&url)))
    }

    fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let http = self.http()?;
        let url = self.url(path);
        self.options
            .retry
            .run(&format!("POST {}", path), || execute(http.post(&url).json(body)))
    }

    /// Traces (if needed), submits and waits for the terminal result.
    ///
    /// A `failed` experiment is returned as a normal result. With a cache
    /// directory configured, a previously completed identical submission is
    /// returned without network access and a pending one is resumed.
    pub fn submit(&self, source: impl TraceSource) -> Result<SubmissionResult> {
        let trace = source.into_trace()?;
        ensure_submittable(&trace)?;
        self.http()?;

        let Some(cache) = &self.cache else {
            let experiment_id = self.create_submission(&trace)?;
            return self.poll(&experiment_id);
        };

        let challenge_id = self.challenge_id();
        let key = cache_key(challenge_id, &trace);
        if let Some(entry) = cache.get(&key) {
            if let Some(result) = self.resume_cached(cache, &key, entry)? {
                return Ok(result);
            }
        }

        let experiment_id = self.create_submission(&trace)?;
        if let Err(e) = cache.put(&key, &CacheEntry::pending(challenge_id, &key, &experiment_id)) {
            warn!(error = %e, "could not record pending submission");
        }
        let result = self.poll(&experiment_id)?;
        self.remember(cache, &key, &result);
        Ok(result)
    }

    fn resume_cached(
        &self,
        cache: &SubmissionCache,
        key: &str,
        entry: CacheEntry,
    ) -> Result<Option<SubmissionResult>> {
        match entry.status.as_str() {
            "complete" => match entry.result.map(SubmissionResult::from_response) {
                Some(Ok(result)) => {
                    info!(experiment_id = %result.experiment_id, "using cached result");
                    Ok(Some(result))
                }
                _ => {
                    warn!(key, "cached result is unusable, resubmitting");
                    cache.remove(key)?;
                    Ok(None)
                }
            },
            STATUS_PENDING => {
                info!(experiment_id = %entry.experiment_id, "resuming cached pending submission");
                match self.poll(&entry.experiment_id) {
                    Ok(result) => {
                        self.remember(cache, key, &result);
                        Ok(Some(result))
                    }
                    Err(Error::Server { status: 404, .. }) => {
                        warn!(
                            experiment_id = %entry.experiment_id,
                            "cached submission is unknown to the service, resubmitting"
                        );
                        cache.remove(key)?;
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            _ => {
                debug!(key, status = %entry.status, "discarding cached submission");
                cache.remove(key)?;
                Ok(None)
            }
        }
    }

    fn remember(&self, cache: &SubmissionCache, key: &str, result: &SubmissionResult) {
        let entry = CacheEntry::finished(self.challenge_id(), key, result);
        if let Err(e) = cache.put(key, &entry) {
            warn!(error = %e, "could not record submission result");
        }
    }

    /// Creates the submission and returns its experiment id without waiting.
    pub fn create_submission(&self, trace: &Trace) -> Result<String> {
        ensure_submittable(trace)?;
        let body = encode_submission(self.challenge_id(), trace);
        let response = self.post_json("/submissions", &body)?;
        let experiment_id = experiment_id_of(&response)?;
        info!(
            experiment_id = %experiment_id,
            wells = trace.well_count(),
            ops = trace.op_count(),
            "submission created"
        );
        Ok(experiment_id)
    }

    /// Waits for an existing submission under the configured poll policy.
    /// On timeout the job keeps running server-side.
    pub fn poll(&self, experiment_id: &str) -> Result<SubmissionResult> {
        let path = format!("/submissions/{}", experiment_id);
        let result = poll_until(&self.options.poll, experiment_id, |attempt| {
            let response = self.get_json(&path)?;
            let status = JobStatus::of(&response);
            debug!(experiment_id, attempt, status = %status, "polled submission");
            if status.is_terminal() {
                SubmissionResult::from_response(response).map(Some)
            } else {
                Ok(None)
            }
        })?;
        match result.status {
            ExperimentStatus::Complete => {
                info!(experiment_id = %result.experiment_id, "experiment complete")
            }
            ExperimentStatus::Failed => warn!(
                experiment_id = %result.experiment_id,
                error = result.error.as_deref().unwrap_or_default(),
                "experiment failed"
            ),
        }
        Ok(result)
    }

    pub fn get_experiment(&self, experiment_id: &str) -> Result<Value> {
        self.get_json(&format!("/submissions/{}", experiment_id))
    }

    pub fn list_experiments(&self) -> Result<Vec<ExperimentSummary>> {
        parse_experiment_list(self.get_json("/submissions")?)
    }

    pub fn user(&self) -> Result<Value> {
        self.get_json("/user")
    }

    pub fn target(&self, challenge_id: &str) -> Result<TargetImage> {
        let response = self.get_json(&format!("/challenges/{}/target", challenge_id))?;
        TargetImage::from_response(&response)
    }

    /// Entries in ascending rank order, whatever order the service used.
    pub fn leaderboard(&self, challenge_id: &str) -> Result<Vec<LeaderboardEntry>> {
        parse_leaderboard(self.get_json(&format!("/challenges/{}/leaderboard", challenge_id))?)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

fn ensure_submittable(trace: &Trace) -> Result<()> {
    if trace.is_empty() {
        return Err(Error::validation(
            "experiment has no operations; call fill(), mix() or image() on a well",
        ));
    }
    Ok(())
}

fn execute(request: RequestBuilder) -> Result<Value> {
    let response = request.send().map_err(classify_send_error)?;
    let status = response.status();
    let body = response
        .text()
        .map_err(|e| Error::Transport(format!("could not read response body: {}", e)))?;
    if !status.is_success() {
        return Err(classify_status(status.as_u16(), &body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|e| Error::format(format!("response is not valid JSON: {}", e)))
}

fn classify_send_error(err: reqwest::Error) -> Error {
    if err.is_builder() {
        return Error::Config(format!("invalid request: {}", err));
    }
    Error::Transport(err.to_string())
}

fn server_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let field = parsed.as_ref().and_then(|v| {
        ["detail", "message", "error"]
            .iter()
            .find_map(|key| v.get(*key))
            .map(|m| match m {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    });
    match field {
        Some(message) => message,
        None if body.trim().is_empty() => "no response body".to_string(),
        None => body.trim().to_string(),
    }
}

fn classify_status(status: u16, body: &str) -> Error {
    let message = server_message(body);
    match status {
        401 | 403 => Error::Authentication(message),
        429 | 502 | 503 | 504 => Error::Transport(format!("HTTP {}: {}", status, message)),
        _ => Error::Server { status, message },
    }
}
