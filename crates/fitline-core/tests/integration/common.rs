use std::sync::{Arc, Mutex};

use fitline_core::backoff::Jitter;
use fitline_core::{
    AppError, CompletionClient, CompletionRequest, Credential, DispatchConfig, Dispatcher,
    EgressRoute, RoundRobinPool,
};

type Responder = dyn Fn(&CompletionRequest) -> Result<String, AppError> + Send + Sync;

/// Completion service stand-in that answers from the prompt it receives.
#[derive(Clone)]
pub struct FakeService {
    respond: Arc<Responder>,
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl FakeService {
    pub fn new(
        respond: impl Fn(&CompletionRequest) -> Result<String, AppError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Arc::new(respond),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn credentials_used(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.credential.expose().to_string())
            .collect()
    }
}

impl CompletionClient for FakeService {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.respond)(&request)
    }
}

pub fn dispatcher(
    service: FakeService,
    keys: &[&str],
    max_concurrent: usize,
) -> Dispatcher<FakeService> {
    let credentials = RoundRobinPool::new(
        "credential",
        keys.iter().map(|k| Credential::new(*k)).collect(),
    )
    .unwrap();
    let egress = RoundRobinPool::new("egress", vec![EgressRoute::Direct]).unwrap();
    let config = DispatchConfig::default()
        .with_max_concurrent(max_concurrent)
        .with_jitter(Jitter::none());
    Dispatcher::new(service, credentials, egress, config)
}

/// Split a prompt on a numbered section marker, e.g. `=== RESUME `,
/// returning `(number, section body)` pairs.
pub fn sections<'a>(prompt: &'a str, marker: &str) -> Vec<(usize, &'a str)> {
    prompt
        .split(marker)
        .skip(1)
        .filter_map(|section| {
            let digits: String = section.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok().map(|n| (n, section))
        })
        .collect()
}
