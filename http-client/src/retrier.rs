use cirro_http::{
    BackoffPolicy, Request, Response, ResponseError, RetryCondition, RetryOptions, RuntimeOptions,
};
use std::{borrow::Cow, time::Duration};

/// 重试引擎的最小退避时长
pub const MIN_BACKOFF: Duration = Duration::from_millis(100);

/// 重试引擎的最大退避时长
pub const MAX_BACKOFF: Duration = Duration::from_millis(120_000);

const MAX_BACKOFF_MS: u64 = MAX_BACKOFF.as_millis() as u64;
const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// 未配置重试条件时视为瞬时失败的错误名称
const TRANSIENT_ERROR_NAMES: &[&str] = &[
    "TimeoutError",
    "ConnectError",
    "SendError",
    "ReceiveError",
    "ProxyError",
    "UnknownHostError",
];

/// 一次请求尝试的结果记录
///
/// 每次尝试前由调用方重新创建，重试引擎只读取，不修改历史
#[derive(Debug)]
pub struct RetryPolicyContext<'a, B> {
    attempts: usize,
    error: Option<&'a ResponseError>,
    request: Option<&'a Request>,
    response: Option<&'a Response<B>>,
}

impl<'a, B> RetryPolicyContext<'a, B> {
    /// 创建结果记录构建器
    ///
    /// `attempts` 为已经重试的次数，首次尝试前为 0
    #[inline]
    pub fn builder(attempts: usize) -> RetryPolicyContextBuilder<'a, B> {
        RetryPolicyContextBuilder(Self {
            attempts,
            error: None,
            request: None,
            response: None,
        })
    }

    /// 获取已经重试的次数
    #[inline]
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// 获取最近一次失败
    #[inline]
    pub fn error(&self) -> Option<&ResponseError> {
        self.error
    }

    /// 获取最近一次请求
    #[inline]
    pub fn request(&self) -> Option<&Request> {
        self.request
    }

    /// 获取最近一次响应
    #[inline]
    pub fn response(&self) -> Option<&Response<B>> {
        self.response
    }

    /// 获取服务端建议的重试间隔
    ///
    /// 优先取自最近一次失败，其次取自最近一次响应的 `Retry-After` Header
    pub fn retry_after_hint(&self) -> Option<Duration> {
        if let Some(retry_after) = self.error.and_then(|error| error.retry_after()) {
            return Some(retry_after);
        }
        self.response
            .and_then(|response| response.headers().get("retry-after"))
            .and_then(|header_value| header_value.to_str().ok())
            .and_then(|seconds| seconds.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

/// 结果记录构建器
#[derive(Debug)]
pub struct RetryPolicyContextBuilder<'a, B>(RetryPolicyContext<'a, B>);

impl<'a, B> RetryPolicyContextBuilder<'a, B> {
    /// 设置最近一次失败
    #[inline]
    pub fn error(&mut self, error: &'a ResponseError) -> &mut Self {
        self.0.error = Some(error);
        self
    }

    /// 设置最近一次请求
    #[inline]
    pub fn request(&mut self, request: &'a Request) -> &mut Self {
        self.0.request = Some(request);
        self
    }

    /// 设置最近一次响应
    #[inline]
    pub fn response(&mut self, response: &'a Response<B>) -> &mut Self {
        self.0.response = Some(response);
        self
    }

    /// 构建结果记录
    #[inline]
    pub fn build(&mut self) -> RetryPolicyContext<'a, B> {
        RetryPolicyContext {
            attempts: self.0.attempts,
            error: self.0.error,
            request: self.0.request,
            response: self.0.response,
        }
    }
}

fn find_condition<'a>(
    options: &'a RetryOptions,
    error: Option<&ResponseError>,
) -> Option<&'a RetryCondition> {
    let error = error?;
    options
        .retry_conditions()
        .iter()
        .find(|condition| condition.matches(error.name(), error.code()))
}

/// 判定一次失败之后是否继续重试
///
/// 首次尝试总是放行，否决条件先于重试条件判定，
/// 首个命中的重试条件限定最大重试次数
pub fn should_retry<B>(
    options: Option<&RetryOptions>,
    context: &RetryPolicyContext<'_, B>,
) -> bool {
    if context.attempts() == 0 {
        return true;
    }
    let Some(options) = options else {
        return false;
    };
    if !options.retryable() {
        return false;
    }
    let Some(error) = context.error() else {
        return false;
    };
    if options
        .no_retry_conditions()
        .iter()
        .any(|condition| condition.matches(error.name(), error.code()))
    {
        return false;
    }
    match options
        .retry_conditions()
        .iter()
        .find(|condition| condition.matches(error.name(), error.code()))
    {
        Some(condition) => context.attempts() < condition.max_attempts(),
        None => false,
    }
}

/// 计算下一次尝试前的退避时长
///
/// 服务端建议的重试间隔优先于退避策略，结果不超过命中条件的
/// 退避上限（未设置时为引擎最大退避时长）
pub fn backoff_time<B>(
    options: Option<&RetryOptions>,
    context: &RetryPolicyContext<'_, B>,
) -> Duration {
    let Some(condition) = options.and_then(|options| find_condition(options, context.error()))
    else {
        return MIN_BACKOFF;
    };
    let cap = condition.max_delay().unwrap_or(MAX_BACKOFF);
    if let Some(retry_after) = context.retry_after_hint() {
        return retry_after.min(cap);
    }
    match condition.backoff() {
        None => MIN_BACKOFF,
        Some(policy) => policy.delay(context.attempts()).min(cap),
    }
}

/// 计算实际生效的重试选项
///
/// 配置了 [`RuntimeOptions::retry_options`] 时直接使用；否则根据
/// `autoretry` 等标量配置合成等价的重试选项，保证只有一条判定路径
pub fn effective_retry_options(options: &RuntimeOptions) -> Option<Cow<'_, RetryOptions>> {
    if let Some(retry_options) = options.retry_options() {
        return Some(Cow::Borrowed(retry_options));
    }
    if !options.autoretry().unwrap_or(false) {
        return None;
    }

    let period = options
        .backoff_period()
        .unwrap_or(MIN_BACKOFF.as_millis() as u64);
    let backoff = match options.backoff_policy().unwrap_or("fixed") {
        "no" => None,
        "random" => Some(BackoffPolicy::Random {
            period,
            cap: MAX_BACKOFF_MS,
        }),
        "exponential" => Some(BackoffPolicy::Exponential {
            period,
            cap: MAX_BACKOFF_MS,
        }),
        "equal_jitter" | "equalJitter" => Some(BackoffPolicy::EqualJitter {
            period,
            cap: MAX_BACKOFF_MS,
        }),
        "full_jitter" | "fullJitter" => Some(BackoffPolicy::FullJitter {
            period,
            cap: MAX_BACKOFF_MS,
        }),
        _ => Some(BackoffPolicy::Fixed { period }),
    };

    let mut condition = RetryCondition::builder();
    condition.max_attempts(options.max_attempts().unwrap_or(DEFAULT_MAX_ATTEMPTS));
    for error_name in TRANSIENT_ERROR_NAMES {
        condition.exception(*error_name);
    }
    if let Some(backoff) = backoff {
        condition.backoff(backoff);
    }
    Some(Cow::Owned(
        RetryOptions::builder()
            .retryable(true)
            .retry_condition(condition.build())
            .build(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirro_http::{ResponseBody, ResponseErrorKind};

    fn response_error(name: &str) -> ResponseError {
        let mut error = ResponseError::new(ResponseErrorKind::ReceiveError, "test error");
        error.set_name(name);
        error
    }

    fn retry_options(max_attempts: usize) -> RetryOptions {
        RetryOptions::builder()
            .retryable(true)
            .retry_condition(
                RetryCondition::builder()
                    .exception("ResponseException")
                    .max_attempts(max_attempts)
                    .build(),
            )
            .build()
    }

    fn context<'a>(
        attempts: usize,
        error: &'a ResponseError,
    ) -> RetryPolicyContext<'a, ResponseBody> {
        RetryPolicyContext::builder(attempts).error(error).build()
    }

    #[test]
    fn test_first_attempt_always_proceeds() {
        let context = RetryPolicyContext::<ResponseBody>::builder(0).build();
        assert!(should_retry(None, &context));
        assert!(should_retry(Some(&RetryOptions::default()), &context));
    }

    #[test]
    fn test_not_retryable_never_retries() {
        let options = RetryOptions::builder()
            .retryable(false)
            .retry_condition(
                RetryCondition::builder()
                    .exception("ResponseException")
                    .max_attempts(10)
                    .build(),
            )
            .build();
        let error = response_error("ResponseException");
        for attempts in 1..5 {
            assert!(!should_retry(Some(&options), &context(attempts, &error)));
        }
    }

    #[test]
    fn test_no_retry_condition_vetoes_retry_condition() {
        let options = RetryOptions::builder()
            .retryable(true)
            .retry_condition(
                RetryCondition::builder()
                    .exception("ResponseException")
                    .max_attempts(10)
                    .build(),
            )
            .no_retry_condition(
                RetryCondition::builder()
                    .error_code("InvalidAccessKey")
                    .build(),
            )
            .build();
        let mut error = response_error("ResponseException");
        assert!(should_retry(Some(&options), &context(1, &error)));
        error.set_code("InvalidAccessKey");
        assert!(!should_retry(Some(&options), &context(1, &error)));
    }

    #[test]
    fn test_max_attempts_boundary() {
        let options = retry_options(3);
        let error = response_error("ResponseException");
        assert!(should_retry(Some(&options), &context(1, &error)));
        assert!(should_retry(Some(&options), &context(2, &error)));
        assert!(!should_retry(Some(&options), &context(3, &error)));
    }

    #[test]
    fn test_unmatched_error_is_not_retried() {
        let options = retry_options(3);
        let error = response_error("RequestException");
        assert!(!should_retry(Some(&options), &context(1, &error)));
    }

    #[test]
    fn test_fixed_backoff_is_attempt_independent() {
        let options = RetryOptions::builder()
            .retryable(true)
            .retry_condition(
                RetryCondition::builder()
                    .exception("ResponseException")
                    .max_attempts(10)
                    .backoff(BackoffPolicy::Fixed { period: 1000 })
                    .build(),
            )
            .build();
        let error = response_error("ResponseException");
        assert_eq!(
            backoff_time(Some(&options), &context(1, &error)),
            Duration::from_millis(1000)
        );
        assert_eq!(
            backoff_time(Some(&options), &context(5, &error)),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_exponential_backoff_progression() {
        let options = RetryOptions::builder()
            .retryable(true)
            .retry_condition(
                RetryCondition::builder()
                    .exception("ResponseException")
                    .max_attempts(10)
                    .backoff(BackoffPolicy::Exponential {
                        period: 1,
                        cap: MAX_BACKOFF_MS,
                    })
                    .build(),
            )
            .build();
        let error = response_error("ResponseException");
        assert_eq!(
            backoff_time(Some(&options), &context(1, &error)),
            Duration::from_millis(2)
        );
        assert_eq!(
            backoff_time(Some(&options), &context(2, &error)),
            Duration::from_millis(4)
        );
        assert_eq!(
            backoff_time(Some(&options), &context(3, &error)),
            Duration::from_millis(8)
        );
    }

    #[test]
    fn test_retry_after_hint_respects_cap() {
        let options = RetryOptions::builder()
            .retryable(true)
            .retry_condition(
                RetryCondition::builder()
                    .exception("ResponseException")
                    .max_attempts(10)
                    .max_delay(Duration::from_millis(10000))
                    .backoff(BackoffPolicy::Fixed { period: 1000 })
                    .build(),
            )
            .build();
        let mut error = response_error("ResponseException");
        error.set_retry_after(Duration::from_millis(5000));
        assert_eq!(
            backoff_time(Some(&options), &context(1, &error)),
            Duration::from_millis(5000)
        );
        error.set_retry_after(Duration::from_millis(60000));
        assert_eq!(
            backoff_time(Some(&options), &context(1, &error)),
            Duration::from_millis(10000)
        );
    }

    #[test]
    fn test_backoff_never_exceeds_effective_max_delay() {
        let policies = [
            BackoffPolicy::Fixed { period: 999999 },
            BackoffPolicy::Random {
                period: 50000,
                cap: u64::MAX,
            },
            BackoffPolicy::Exponential {
                period: 1000,
                cap: u64::MAX,
            },
            BackoffPolicy::FullJitter {
                period: 1,
                cap: u64::MAX,
            },
        ];
        let error = response_error("ResponseException");
        for policy in policies {
            let options = RetryOptions::builder()
                .retryable(true)
                .retry_condition(
                    RetryCondition::builder()
                        .exception("ResponseException")
                        .max_attempts(100)
                        .backoff(policy)
                        .build(),
                )
                .build();
            for attempts in 1..32 {
                assert!(backoff_time(Some(&options), &context(attempts, &error)) <= MAX_BACKOFF);
            }
        }
    }

    #[test]
    fn test_unmatched_condition_yields_minimum_backoff() {
        let error = response_error("RequestException");
        assert_eq!(backoff_time(None, &context(1, &error)), MIN_BACKOFF);
        assert_eq!(
            backoff_time(Some(&retry_options(3)), &context(1, &error)),
            MIN_BACKOFF
        );
    }

    #[test]
    fn test_condition_without_backoff_yields_minimum() {
        let options = retry_options(3);
        let error = response_error("ResponseException");
        assert_eq!(backoff_time(Some(&options), &context(1, &error)), MIN_BACKOFF);
    }

    #[test]
    fn test_retry_after_from_response_header() {
        let error = response_error("ResponseException");
        let response: Response<ResponseBody> = Response::builder()
            .header(
                "retry-after".parse().unwrap(),
                "3".parse().unwrap(),
            )
            .build();
        let context = RetryPolicyContext::builder(1)
            .error(&error)
            .response(&response)
            .build();
        assert_eq!(context.retry_after_hint(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_effective_retry_options_synthesized_from_scalars() {
        let options = RuntimeOptions::builder()
            .autoretry(true)
            .max_attempts(5)
            .backoff_policy("fixed")
            .backoff_period(250)
            .build();
        let retry_options = effective_retry_options(&options).unwrap();
        assert!(retry_options.retryable());
        let condition = &retry_options.retry_conditions()[0];
        assert_eq!(condition.max_attempts(), 5);
        assert_eq!(
            condition.backoff(),
            Some(&BackoffPolicy::Fixed { period: 250 })
        );
        assert!(condition
            .exceptions()
            .iter()
            .any(|name| name == "TimeoutError"));

        assert!(effective_retry_options(&RuntimeOptions::default()).is_none());
    }
}
