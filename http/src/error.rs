use std::{error, fmt, time::Duration};

/// HTTP 响应错误类型
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 协议错误，该协议不能支持
    ProtocolError,

    /// 非法的 URL
    InvalidUrl,

    /// 非法的 HTTP 头
    InvalidHeader,

    /// 网络连接失败
    ConnectError,

    /// 代理连接失败
    ProxyError,

    /// 域名解析失败
    UnknownHostError,

    /// 发送失败
    SendError,

    /// 接受失败
    ReceiveError,

    /// 本地 IO 失败
    LocalIoError,

    /// 超时失败
    TimeoutError,

    /// SSL 错误
    SslError,

    /// 重定向次数过多
    TooManyRedirect,

    /// 客户端已经停止，无法发送请求
    ClientClosed,

    /// 未知错误
    UnknownError,

    /// 用户取消
    UserCanceled,
}

impl ErrorKind {
    /// 获取错误类型名称
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ProtocolError => "ProtocolError",
            ErrorKind::InvalidUrl => "InvalidUrl",
            ErrorKind::InvalidHeader => "InvalidHeader",
            ErrorKind::ConnectError => "ConnectError",
            ErrorKind::ProxyError => "ProxyError",
            ErrorKind::UnknownHostError => "UnknownHostError",
            ErrorKind::SendError => "SendError",
            ErrorKind::ReceiveError => "ReceiveError",
            ErrorKind::LocalIoError => "LocalIoError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::SslError => "SslError",
            ErrorKind::TooManyRedirect => "TooManyRedirect",
            ErrorKind::ClientClosed => "ClientClosed",
            ErrorKind::UnknownError => "UnknownError",
            ErrorKind::UserCanceled => "UserCanceled",
        }
    }
}

/// HTTP 响应错误
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    error: Box<dyn error::Error + Send + Sync>,
    name: Option<String>,
    code: Option<String>,
    retry_after: Option<Duration>,
}

impl Error {
    /// 创建 HTTP 响应错误
    #[inline]
    pub fn new(kind: ErrorKind, err: impl Into<Box<dyn error::Error + Send + Sync>>) -> Self {
        Error {
            kind,
            error: err.into(),
            name: None,
            code: None,
            retry_after: None,
        }
    }

    /// 获取 HTTP 响应错误类型
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误名称
    ///
    /// 上层协议未指定错误名称时，返回错误类型名称
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.kind.as_str())
    }

    /// 设置错误名称
    #[inline]
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// 获取服务端错误码
    #[inline]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// 设置服务端错误码
    #[inline]
    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = Some(code.into());
    }

    /// 获取服务端建议的重试间隔
    #[inline]
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// 设置服务端建议的重试间隔
    #[inline]
    pub fn set_retry_after(&mut self, retry_after: Duration) {
        self.retry_after = Some(retry_after);
    }

    #[inline]
    pub fn into_inner(self) -> Box<dyn error::Error + Send + Sync> {
        self.error
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl error::Error for Error {
    #[inline]
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}
