mod error;
mod options;
mod request;
mod response;
mod retry;

pub use error::{Error as ResponseError, ErrorKind as ResponseErrorKind};
pub use http::{
    header::{HeaderMap, HeaderName, HeaderValue},
    method::Method,
    status::StatusCode,
    uri::Uri,
};
pub use options::{RuntimeOptions, RuntimeOptionsBuilder, DEFAULT_CONNECT_TIMEOUT};
pub use request::{Request, RequestBody, RequestBuilder};
pub use response::{
    Body as ResponseBody, Response, ResponseBuilder, Result as ResponseResult,
};
pub use retry::{
    BackoffPolicy, RetryCondition, RetryConditionBuilder, RetryOptions, RetryOptionsBuilder,
};

use std::io::{Cursor, Result as IoResult, Seek, SeekFrom};

/// 可以被重置的输入流
///
/// 重置后的流可以被重新读取，用于请求重试时重放请求体
pub trait Reset {
    /// 重置输入流到起始位置
    fn reset(&mut self) -> IoResult<()>;
}

impl<T: AsRef<[u8]>> Reset for Cursor<T> {
    #[inline]
    fn reset(&mut self) -> IoResult<()> {
        self.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}

/// HTTP 请求处理接口
///
/// 实现该接口，即可处理所有 Cirro SDK 发送的 HTTP 请求
pub trait HttpCaller: Send + Sync {
    /// 发送 HTTP 请求，阻塞直到响应就绪
    ///
    /// 响应就绪指状态码与 Headers 可用，响应体可以继续流式读取
    fn call(&self, request: Request, options: &RuntimeOptions) -> ResponseResult<ResponseBody>;
}
