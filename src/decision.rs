//! Decision services: the text-in, text-out boundary behind every participant.
//!
//! The engine only needs [`DecisionService::respond`]. Providers are picked once per
//! participant through a [`ServiceRegistry`]; model clients are registered by the caller,
//! the crate itself ships a random `MockModel` and two deterministic stubs for tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::bail;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::error::GameError;

/// Identifier of the built-in random provider.
pub const MOCK_MODEL: &str = "MockModel";

/// Send a prompt, get a free-text answer.
pub trait DecisionService: Send {
    /// One request. Errors are retried by [`RetryPolicy::call`].
    fn respond(&mut self, prompt: &str) -> anyhow::Result<String>;
}

/// Shared cancellation flag, checked before every decision-service call.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Has cancellation been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bounded retry with a fixed backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, first one included.
    pub max_attempts: u32,
    /// Sleep between two attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Call `service` until it answers, cancellation is requested, or attempts run out.
    pub fn call(
        &self,
        agent: &str,
        service: &mut dyn DecisionService,
        prompt: &str,
        cancel: &CancelToken,
    ) -> Result<String, GameError> {
        let mut last_error = String::from("no attempt made");
        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(GameError::Cancelled);
            }
            match service.respond(prompt) {
                Ok(text) => {
                    debug!(agent, attempt, response = %text);
                    return Ok(text);
                }
                Err(e) => {
                    warn!(agent, attempt, error = %format!("{e:#}"), "decision service call failed");
                    last_error = format!("{e:#}");
                    if attempt < self.max_attempts {
                        thread::sleep(self.backoff);
                    }
                }
            }
        }
        Err(GameError::DecisionServiceExhausted {
            agent: agent.to_owned(),
            attempts: self.max_attempts,
            last_error,
        })
    }
}

/// What a provider constructor is told about the participant it serves.
#[derive(Clone, Copy, Debug)]
pub struct ProviderRequest<'a> {
    /// Provider identifier, as requested.
    pub model: &'a str,
    /// Strategy texts of the game, in declaration order.
    pub vocabulary: &'a [String],
    /// Seat of the participant.
    pub seat: usize,
    /// Session seed, if any.
    pub seed: Option<u64>,
}

type Constructor =
    Box<dyn Fn(&ProviderRequest<'_>) -> anyhow::Result<Box<dyn DecisionService>> + Send + Sync>;

/// Provider identifier to constructor.
pub struct ServiceRegistry {
    providers: BTreeMap<String, Constructor>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    /// Registry holding only [`MOCK_MODEL`].
    pub fn new() -> Self {
        let mut registry = Self {
            providers: BTreeMap::new(),
        };
        registry.register(MOCK_MODEL, |request| {
            let service: Box<dyn DecisionService> = Box::new(MockService::new(
                request.vocabulary.to_vec(),
                request.seed.map(|s| s.wrapping_add(request.seat as u64)),
            )?);
            Ok(service)
        });
        registry
    }

    /// Add or replace a provider.
    pub fn register<F>(&mut self, id: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&ProviderRequest<'_>) -> anyhow::Result<Box<dyn DecisionService>>
            + Send
            + Sync
            + 'static,
    {
        self.providers.insert(id.into(), Box::new(constructor));
        self
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Build the service of one participant.
    ///
    /// # Errors
    /// [`GameError::UnknownProvider`] for an unregistered identifier, or whatever the
    /// constructor fails with.
    pub fn create(&self, request: &ProviderRequest<'_>) -> anyhow::Result<Box<dyn DecisionService>> {
        let Some(constructor) = self.providers.get(request.model) else {
            return Err(GameError::UnknownProvider {
                requested: request.model.to_owned(),
                available: self.identifiers(),
            }
            .into());
        };
        constructor(request)
    }
}

/// Answers with a random word of the game vocabulary.
pub struct MockService {
    vocabulary: Vec<String>,
    rng: ChaCha8Rng,
}

impl MockService {
    /// Seeded when `seed` is set, from OS entropy otherwise.
    pub fn new(vocabulary: Vec<String>, seed: Option<u64>) -> anyhow::Result<Self> {
        if vocabulary.is_empty() {
            bail!("mock model needs at least one strategy");
        }
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(Self { vocabulary, rng })
    }
}

impl DecisionService for MockService {
    fn respond(&mut self, _prompt: &str) -> anyhow::Result<String> {
        match self.vocabulary.choose(&mut self.rng) {
            Some(word) => Ok(word.clone()),
            None => bail!("mock model has an empty vocabulary"),
        }
    }
}

/// Every prompt a [`ScriptedService`] received, in order. Clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct PromptLog(Arc<Mutex<Vec<String>>>);

impl PromptLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, prompt: &str) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_owned());
    }

    /// Snapshot of the recorded prompts.
    pub fn prompts(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Replays fixed responses in a loop.
#[derive(Clone, Debug)]
pub struct ScriptedService {
    responses: Vec<String>,
    next: usize,
    log: Option<PromptLog>,
}

impl ScriptedService {
    /// Cycle through `responses`. An empty script answers with the empty string.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            next: 0,
            log: None,
        }
    }

    /// Record every received prompt into `log`.
    pub fn with_prompt_log(mut self, log: PromptLog) -> Self {
        self.log = Some(log);
        self
    }
}

impl DecisionService for ScriptedService {
    fn respond(&mut self, prompt: &str) -> anyhow::Result<String> {
        if let Some(log) = &self.log {
            log.push(prompt);
        }
        if self.responses.is_empty() {
            return Ok(String::new());
        }
        let response = self.responses[self.next % self.responses.len()].clone();
        self.next += 1;
        Ok(response)
    }
}

/// Closure-backed service.
pub struct FnService<F>(pub F);

impl<F> DecisionService for FnService<F>
where
    F: FnMut(&str) -> anyhow::Result<String> + Send,
{
    fn respond(&mut self, prompt: &str) -> anyhow::Result<String> {
        (self.0)(prompt)
    }
}

#[cfg(test)]
mod decision_tests {
    use super::*;
    use anyhow::anyhow;

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn scripted_service_cycles_and_logs() {
        let log = PromptLog::new();
        let mut service = ScriptedService::new(["a", "b"]).with_prompt_log(log.clone());
        let answers: Vec<_> = (0..3)
            .map(|i| service.respond(&format!("p{i}")).unwrap())
            .collect();
        assert_eq!(answers, ["a", "b", "a"]);
        assert_eq!(log.prompts(), ["p0", "p1", "p2"]);
    }

    #[test]
    fn retry_recovers_from_transient_failures() {
        let mut calls = 0;
        let mut service = FnService(move |_: &str| {
            calls += 1;
            if calls < 3 {
                Err(anyhow!("rate limited"))
            } else {
                Ok("Defect".to_owned())
            }
        });
        let answer = quick()
            .call("Alice", &mut service, "prompt", &CancelToken::new())
            .unwrap();
        assert_eq!(answer, "Defect");
    }

    #[test]
    fn retry_exhaustion_is_reported() {
        let mut service = FnService(|_: &str| Err(anyhow!("connection refused")));
        let err = quick()
            .call("Bob", &mut service, "prompt", &CancelToken::new())
            .unwrap_err();
        assert_eq!(
            err,
            GameError::DecisionServiceExhausted {
                agent: "Bob".into(),
                attempts: 3,
                last_error: "connection refused".into()
            }
        );
    }

    #[test]
    fn cancelled_token_stops_before_calling() {
        let log = PromptLog::new();
        let mut service = ScriptedService::new(["x"]).with_prompt_log(log.clone());
        let token = CancelToken::new();
        token.cancel();
        let err = quick().call("Alice", &mut service, "prompt", &token).unwrap_err();
        assert_eq!(err, GameError::Cancelled);
        assert!(log.prompts().is_empty());
    }

    #[test]
    fn registry_rejects_unknown_providers() {
        let registry = ServiceRegistry::new();
        let vocabulary = vec!["Cooperate".to_owned(), "Defect".to_owned()];
        let request = ProviderRequest {
            model: "gpt-oss",
            vocabulary: &vocabulary,
            seat: 0,
            seed: None,
        };
        let err = registry.create(&request).err().unwrap();
        match err.downcast_ref::<GameError>() {
            Some(GameError::UnknownProvider { available, .. }) => {
                assert_eq!(available, &[MOCK_MODEL.to_owned()])
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn seeded_mock_is_reproducible() {
        let vocabulary = vec!["Cooperate".to_owned(), "Defect".to_owned()];
        let registry = ServiceRegistry::new();
        let request = ProviderRequest {
            model: MOCK_MODEL,
            vocabulary: &vocabulary,
            seat: 1,
            seed: Some(42),
        };
        let mut a = registry.create(&request).unwrap();
        let mut b = registry.create(&request).unwrap();
        for _ in 0..20 {
            let answer = a.respond("").unwrap();
            assert!(vocabulary.contains(&answer));
            assert_eq!(answer, b.respond("").unwrap());
        }
    }
}
