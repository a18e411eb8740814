mod client;
mod retrier;

pub use client::Client;
pub use retrier::{
    backoff_time, effective_retry_options, should_retry, RetryPolicyContext,
    RetryPolicyContextBuilder, MAX_BACKOFF, MIN_BACKOFF,
};

pub use cirro_curl::CurlClient;
pub use cirro_http::{
    BackoffPolicy, HttpCaller, Request, RequestBody, RequestBuilder, Response, ResponseBody,
    ResponseError, ResponseErrorKind, ResponseResult, RetryCondition, RetryConditionBuilder,
    RetryOptions, RetryOptionsBuilder, RuntimeOptions, RuntimeOptionsBuilder,
};
