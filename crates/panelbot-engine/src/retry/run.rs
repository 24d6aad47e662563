use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};

use super::classify::RetryClass;
use super::policy::RetryPolicy;
use crate::error::{EngineError, EngineResult};
use crate::http::{run_attempt, AttemptResult, RequestSpec, Transport};
use crate::normalize::{extract_image, ImageBytes, TransportDownloader};

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

impl<S: Sleeper + ?Sized> Sleeper for Box<S> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Drives one logical image call to completion: build, send, normalize,
/// back off, repeat.
pub struct RetryController<T: Transport, S: Sleeper = ThreadSleeper> {
    transport: T,
    sleeper: S,
    rng: StdRng,
}

impl<T: Transport> RetryController<T, ThreadSleeper> {
    pub fn with_thread_sleeper(transport: T) -> Self {
        Self::new(transport, ThreadSleeper)
    }
}

impl<T: Transport, S: Sleeper> RetryController<T, S> {
    pub fn new(transport: T, sleeper: S) -> Self {
        Self {
            transport,
            sleeper,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `build` is called once per attempt with the 1-based attempt number.
    /// A build failure ends the loop before anything is sent.
    pub fn execute<B>(
        &mut self,
        mut build: B,
        policy: &RetryPolicy,
        reference: Option<&[u8]>,
    ) -> EngineResult<ImageBytes>
    where
        B: FnMut(u32) -> EngineResult<RequestSpec>,
    {
        let max_attempts = policy.max_attempts();
        let mut attempt = 1;
        loop {
            let request = build(attempt)?;
            let (failure, class) = match run_attempt(&self.transport, &request, policy.classifier())
            {
                AttemptResult::Success { status, body } => {
                    match self.accept(&request, &body, policy, reference) {
                        Ok(image) => {
                            if attempt > 1 {
                                tracing::info!(attempt, status, "image request succeeded after retry");
                            }
                            return Ok(image);
                        }
                        Err(err) => {
                            let class = policy.classifier().classify(&err);
                            (err, class)
                        }
                    }
                }
                AttemptResult::RetryableFailure(err) => (err, RetryClass::Retryable),
                AttemptResult::FatalFailure(err) => (err, RetryClass::Fatal),
            };

            tracing::warn!(
                attempt,
                max_attempts,
                url = %request.url,
                error = %failure,
                "image request attempt failed"
            );
            if class == RetryClass::Fatal || attempt >= max_attempts {
                return Err(failure);
            }
            let delay = policy.backoff_delay(attempt, &mut self.rng);
            tracing::info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "backing off before retry"
            );
            self.sleeper.sleep(delay);
            attempt += 1;
        }
    }

    fn accept(
        &self,
        request: &RequestSpec,
        body: &[u8],
        policy: &RetryPolicy,
        reference: Option<&[u8]>,
    ) -> EngineResult<ImageBytes> {
        let downloader = TransportDownloader::new(&self.transport, request.timeout);
        let image = extract_image(body, &downloader)?;
        if image.is_empty() {
            return Err(EngineError::Decode("provider returned an empty image".to_string()));
        }
        if policy.enforce_distinct_output() {
            if let Some(reference) = reference {
                if outputs_match(&image.bytes, reference) {
                    return Err(EngineError::IdenticalOutput);
                }
            }
        }
        Ok(image)
    }
}

pub fn outputs_match(left: &[u8], right: &[u8]) -> bool {
    Sha256::digest(left) == Sha256::digest(right)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde_json::json;

    use super::*;
    use crate::http::testing::{json_reply, reply, transient, ScriptedTransport};

    #[derive(Default)]
    struct RecordingSleeper {
        slept: RefCell<Vec<Duration>>,
    }

    fn image_reply(bytes: &[u8]) -> EngineResult<crate::http::HttpReply> {
        json_reply(json!({"data": [{"b64_json": BASE64.encode(bytes)}]}))
    }

    fn request(_attempt: u32) -> EngineResult<RequestSpec> {
        Ok(RequestSpec::post_json(
            "http://gen.test/images",
            json!({"prompt": "p"}),
            Duration::from_secs(5),
        ))
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(10),
        )
        .unwrap()
    }

    fn controller<'a>(
        transport: &'a ScriptedTransport,
        sleeper: &'a RecordingSleeper,
    ) -> RetryController<&'a ScriptedTransport, &'a RecordingSleeper> {
        RetryController::new(transport, sleeper).with_rng(StdRng::seed_from_u64(3))
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
        }
    }

    #[test]
    fn always_retryable_runs_exactly_max_attempts_and_returns_last_error() {
        let transport = ScriptedTransport::new(vec![
            reply(503, b"busy-1"),
            reply(503, b"busy-2"),
            reply(429, b"busy-3"),
        ]);
        let sleeper = RecordingSleeper::default();
        let err = controller(&transport, &sleeper)
            .execute(request, &policy(3), None)
            .err();
        assert_eq!(transport.calls(), 3);
        match err {
            Some(EngineError::Remote { status, snippet }) => {
                assert_eq!(status, 429);
                assert_eq!(snippet, "busy-3");
            }
            other => panic!("unexpected {other:?}"),
        }
        let slept = sleeper.slept.borrow();
        assert_eq!(slept.len(), 2);
        assert!(slept[0] >= Duration::from_millis(100) && slept[0] < Duration::from_millis(110));
        assert!(slept[1] >= Duration::from_millis(200) && slept[1] < Duration::from_millis(210));
    }

    #[test]
    fn success_on_attempt_k_stops_there() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new(vec![
            Err(transient("connection reset")),
            reply(502, b"gateway"),
            image_reply(b"third time"),
            image_reply(b"never sent"),
        ]);
        let sleeper = RecordingSleeper::default();
        let image = controller(&transport, &sleeper).execute(request, &policy(5), None)?;
        assert_eq!(image.bytes, b"third time");
        assert_eq!(transport.calls(), 3);
        assert_eq!(sleeper.slept.borrow().len(), 2);
        Ok(())
    }

    #[test]
    fn fatal_status_stops_immediately() {
        let transport = ScriptedTransport::new(vec![
            reply(500, b"oops"),
            reply(400, b"bad prompt"),
            image_reply(b"unused"),
        ]);
        let sleeper = RecordingSleeper::default();
        let err = controller(&transport, &sleeper)
            .execute(request, &policy(5), None)
            .err();
        assert!(matches!(err, Some(EngineError::Remote { status: 400, .. })));
        assert_eq!(transport.calls(), 2);
        assert_eq!(sleeper.slept.borrow().len(), 1);
    }

    #[test]
    fn single_attempt_never_sleeps() {
        let transport = ScriptedTransport::new(vec![reply(503, b"busy")]);
        let sleeper = RecordingSleeper::default();
        let err = controller(&transport, &sleeper)
            .execute(request, &RetryPolicy::single_attempt(), None)
            .err();
        assert!(matches!(err, Some(EngineError::Remote { status: 503, .. })));
        assert_eq!(transport.calls(), 1);
        assert!(sleeper.slept.borrow().is_empty());
    }

    #[test]
    fn build_failure_is_fatal_before_any_request() {
        let transport = ScriptedTransport::new(vec![image_reply(b"unused")]);
        let sleeper = RecordingSleeper::default();
        let err = controller(&transport, &sleeper)
            .execute(
                |_| Err(EngineError::config("OPENAI_API_KEY is not set")),
                &policy(3),
                None,
            )
            .err();
        assert!(matches!(err, Some(EngineError::Config(_))));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn identical_output_is_retried_when_enforced() -> anyhow::Result<()> {
        let reference = b"reference-photo".to_vec();
        let transport = ScriptedTransport::new(vec![
            image_reply(&reference),
            image_reply(b"fresh drawing"),
        ]);
        let sleeper = RecordingSleeper::default();
        let enforced = policy(3).with_enforce_distinct_output(true);
        let image =
            controller(&transport, &sleeper).execute(request, &enforced, Some(&reference))?;
        assert_eq!(image.bytes, b"fresh drawing");
        assert_eq!(transport.calls(), 2);
        Ok(())
    }

    #[test]
    fn identical_output_is_accepted_without_enforcement() -> anyhow::Result<()> {
        let reference = b"reference-photo".to_vec();
        let transport = ScriptedTransport::new(vec![image_reply(&reference)]);
        let sleeper = RecordingSleeper::default();
        let image = controller(&transport, &sleeper).execute(request, &policy(3), Some(&reference))?;
        assert_eq!(image.bytes, reference);
        Ok(())
    }

    #[test]
    fn shape_error_is_not_retried() {
        let transport = ScriptedTransport::new(vec![json_reply(json!({"created": 1}))]);
        let sleeper = RecordingSleeper::default();
        let err = controller(&transport, &sleeper)
            .execute(request, &policy(4), None)
            .err();
        assert!(matches!(err, Some(EngineError::Shape { .. })));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn download_failure_after_success_is_classified() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new(vec![
            json_reply(json!({"data": [{"url": "http://cdn.test/a.png"}]})),
            reply(503, b"cdn busy"),
            json_reply(json!({"data": [{"url": "http://cdn.test/b.png"}]})),
            reply(200, b"image-bytes"),
        ]);
        let sleeper = RecordingSleeper::default();
        let image = controller(&transport, &sleeper).execute(request, &policy(3), None)?;
        assert_eq!(image.bytes, b"image-bytes");
        assert_eq!(transport.calls(), 4);
        let seen = transport.seen.borrow();
        assert_eq!(seen[3].url, "http://cdn.test/b.png");
        assert_eq!(seen[3].method, reqwest::Method::GET);
        Ok(())
    }

    #[test]
    fn builder_sees_each_attempt_number() {
        let transport = ScriptedTransport::new(vec![reply(503, b""), reply(503, b"")]);
        let sleeper = RecordingSleeper::default();
        let attempts = Cell::new(Vec::new());
        let _ = controller(&transport, &sleeper).execute(
            |attempt| {
                let mut seen = attempts.take();
                seen.push(attempt);
                attempts.set(seen);
                request(attempt)
            },
            &policy(2),
            None,
        );
        assert_eq!(attempts.take(), vec![1, 2]);
    }

    #[test]
    fn outputs_match_compares_content() {
        assert!(outputs_match(b"abc", b"abc"));
        assert!(!outputs_match(b"abc", b"abd"));
    }
}
