use super::retrier::{backoff_time, effective_retry_options, should_retry, RetryPolicyContext};
use cirro_curl::CurlClient;
use cirro_http::{HttpCaller, Request, Reset, ResponseBody, ResponseResult, RuntimeOptions};
use log::{debug, info};
use std::{io::Result as IoResult, sync::Arc, thread::sleep};

/// SDK HTTP 客户端
///
/// 在传输核心之上实现提交、判定、退避、重试的调用循环。
/// 传输核心自身从不重试，单次尝试的成败在这里汇入重试引擎
pub struct Client {
    caller: Arc<dyn HttpCaller>,
}

impl Client {
    /// 通过任意传输实现创建客户端
    #[inline]
    pub fn new(caller: impl HttpCaller + 'static) -> Self {
        Self {
            caller: Arc::new(caller),
        }
    }

    /// 创建基于 Curl 传输的客户端，并启动其 I/O 线程
    pub fn curl() -> IoResult<Self> {
        let caller = CurlClient::default();
        caller.start()?;
        Ok(Self::new(caller))
    }

    /// 发送 HTTP 请求
    ///
    /// 失败后根据重试选项判定是否重试以及重试前的退避时长。
    /// 流式请求体无法重放，首次失败即为最终结果
    pub fn call(&self, request: Request, options: &RuntimeOptions) -> ResponseResult<ResponseBody> {
        let retry_options = effective_retry_options(options);
        let retry_options = retry_options.as_deref();
        let mut attempts = 0usize;
        let mut current = request;
        loop {
            let replay = current.try_clone();
            match self.caller.call(current, options) {
                Ok(response) => return Ok(response),
                Err(error) => {
                    attempts += 1;
                    let Some(mut next) = replay else {
                        debug!("request body is not replayable, giving up after first failure");
                        return Err(error);
                    };
                    let delay = {
                        let context: RetryPolicyContext<'_, ResponseBody> =
                            RetryPolicyContext::builder(attempts)
                                .error(&error)
                                .request(&next)
                                .build();
                        if !should_retry(retry_options, &context) {
                            return Err(error);
                        }
                        backoff_time(retry_options, &context)
                    };
                    info!(
                        "request failed with {}, retrying after {:?} (retried {} times)",
                        error.kind().as_str(),
                        delay,
                        attempts
                    );
                    sleep(delay);
                    if next.body_mut().reset().is_err() {
                        return Err(error);
                    }
                    current = next;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirro_http::{
        BackoffPolicy, RequestBody, ResponseError, ResponseErrorKind, Response, RetryCondition,
        RetryOptions,
    };
    use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

    struct FlakyCaller {
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyCaller {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl HttpCaller for FlakyCaller {
        fn call(
            &self,
            _request: Request,
            _options: &RuntimeOptions,
        ) -> ResponseResult<ResponseBody> {
            let call = self.calls.fetch_add(1, Relaxed);
            if call < self.failures {
                Err(ResponseError::new(
                    ResponseErrorKind::TimeoutError,
                    "simulated timeout",
                ))
            } else {
                Ok(Response::builder()
                    .body(ResponseBody::from_bytes(b"ok".to_vec()))
                    .build())
            }
        }
    }

    fn timeout_retry_options(max_attempts: usize) -> RuntimeOptions {
        RuntimeOptions::builder()
            .retry_options(
                RetryOptions::builder()
                    .retryable(true)
                    .retry_condition(
                        RetryCondition::builder()
                            .exception("TimeoutError")
                            .max_attempts(max_attempts)
                            .backoff(BackoffPolicy::Fixed { period: 1 })
                            .build(),
                    )
                    .build(),
            )
            .build()
    }

    #[test]
    fn test_retries_until_success() {
        let caller = Arc::new(FlakyCaller::new(2));
        let client = Client {
            caller: caller.to_owned(),
        };
        let response = client
            .call(Request::builder().build(), &timeout_retry_options(5))
            .unwrap();
        assert_eq!(response.status_code().as_u16(), 200);
        assert_eq!(caller.calls.load(Relaxed), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let caller = Arc::new(FlakyCaller::new(usize::MAX));
        let client = Client {
            caller: caller.to_owned(),
        };
        let err = client
            .call(Request::builder().build(), &timeout_retry_options(3))
            .unwrap_err();
        assert_eq!(err.kind(), ResponseErrorKind::TimeoutError);
        assert_eq!(caller.calls.load(Relaxed), 3);
    }

    #[test]
    fn test_no_retry_without_options() {
        let caller = Arc::new(FlakyCaller::new(usize::MAX));
        let client = Client {
            caller: caller.to_owned(),
        };
        let err = client
            .call(Request::builder().build(), &RuntimeOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ResponseErrorKind::TimeoutError);
        assert_eq!(caller.calls.load(Relaxed), 1);
    }

    #[test]
    fn test_streaming_body_is_not_retried() {
        use std::io::Cursor;

        let caller = Arc::new(FlakyCaller::new(usize::MAX));
        let client = Client {
            caller: caller.to_owned(),
        };
        let request = Request::builder()
            .body(RequestBody::from_reader(Cursor::new(vec![0u8; 8]), 8))
            .build();
        let err = client
            .call(request, &timeout_retry_options(5))
            .unwrap_err();
        assert_eq!(err.kind(), ResponseErrorKind::TimeoutError);
        assert_eq!(caller.calls.load(Relaxed), 1);
    }

    #[test]
    fn test_legacy_autoretry_scalars_drive_the_engine() {
        let caller = Arc::new(FlakyCaller::new(usize::MAX));
        let client = Client {
            caller: caller.to_owned(),
        };
        let options = RuntimeOptions::builder()
            .autoretry(true)
            .max_attempts(2)
            .backoff_policy("fixed")
            .backoff_period(1)
            .build();
        let err = client
            .call(Request::builder().build(), &options)
            .unwrap_err();
        assert_eq!(err.kind(), ResponseErrorKind::TimeoutError);
        assert_eq!(caller.calls.load(Relaxed), 2);
    }
}
