#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use temps_sdk::{
    ClientOptions, MakeRequest, Transport, TransportError, TransportOptions, TransportRequest,
    TransportResponse,
};

pub const TEST_DSN: &str = "https://test_key@temps.example.com/1";
pub const TEST_ENDPOINT: &str = "https://temps.example.com/api/1/store/?sentry_key=test_key";

/// What the recording request does with the next call
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(TransportError),
    Panic,
}

/// Request primitive that records every payload it is asked to deliver
pub struct RecordingRequest {
    behavior: Mutex<Behavior>,
    rejected: Mutex<HashMap<String, TransportError>>,
    delay: Mutex<Option<Duration>>,
    attempts: Mutex<Vec<String>>,
    delivered: Mutex<Vec<String>>,
}

impl RecordingRequest {
    pub fn new() -> Arc<Self> {
        Self::with_behavior(Behavior::Succeed)
    }

    pub fn with_behavior(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            rejected: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            attempts: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Fail every request carrying exactly `payload`, whatever the behavior
    pub fn reject_payload(&self, payload: &str, error: TransportError) {
        self.rejected
            .lock()
            .unwrap()
            .insert(payload.to_string(), error);
    }

    /// Sleep this long inside every request before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_json(&self) -> Vec<Value> {
        self.delivered()
            .iter()
            .map(|payload| serde_json::from_str(payload).unwrap())
            .collect()
    }
}

#[async_trait]
impl MakeRequest for RecordingRequest {
    fn destination(&self) -> &str {
        TEST_ENDPOINT
    }

    async fn make_request(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        self.attempts.lock().unwrap().push(request.payload.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let rejected = self.rejected.lock().unwrap().get(&request.payload).cloned();
        if let Some(error) = rejected {
            return Err(error);
        }
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            Behavior::Succeed => {
                self.delivered.lock().unwrap().push(request.payload);
                Ok(TransportResponse {
                    status_code: Some(200),
                    error: None,
                })
            }
            Behavior::Fail(error) => Err(error),
            Behavior::Panic => panic!("request future exploded"),
        }
    }
}

/// Request primitive that panics before it even produces a future
pub struct EagerPanicRequest;

impl MakeRequest for EagerPanicRequest {
    fn destination(&self) -> &str {
        TEST_ENDPOINT
    }

    fn make_request<'life0, 'async_trait>(
        &'life0 self,
        _request: TransportRequest,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        Self: 'async_trait,
    {
        panic!("request primitive exploded")
    }
}

pub fn production_transport(request: Arc<RecordingRequest>) -> Transport {
    Transport::new(TransportOptions::production(), request).unwrap()
}

/// Client options wired to a production transport around `request`
pub fn production_options(request: Arc<RecordingRequest>) -> ClientOptions {
    ClientOptions::from_dsn(TEST_DSN)
        .unwrap()
        .with_transport(production_transport(request))
}
