use super::error::Error;
use assert_impl::assert_impl;
use http::{
    header::{HeaderMap, HeaderName, HeaderValue},
    status::StatusCode,
};
use std::{
    fmt::Debug,
    io::{Cursor, Read, Result as IoResult},
    result,
};

trait ReadDebug: Read + Debug + Send {}
impl<T: Read + Debug + Send> ReadDebug for T {}

/// HTTP 响应体
#[derive(Debug)]
pub struct Body(BodyInner);

#[derive(Debug)]
enum BodyInner {
    Bytes(Cursor<Vec<u8>>),
    Reader(Box<dyn ReadDebug>),
}

impl Body {
    /// 通过二进制数据创建 HTTP 响应体
    #[inline]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(BodyInner::Bytes(Cursor::new(bytes.into())))
    }

    /// 通过输入流创建 HTTP 响应体
    #[inline]
    pub fn from_reader(reader: impl Read + Debug + Send + 'static) -> Self {
        Self(BodyInner::Reader(Box::new(reader)))
    }
}

impl Default for Body {
    #[inline]
    fn default() -> Self {
        Self(BodyInner::Bytes(Default::default()))
    }
}

impl Read for Body {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        match &mut self.0 {
            BodyInner::Bytes(bytes) => bytes.read(buf),
            BodyInner::Reader(reader) => reader.read(buf),
        }
    }
}

/// HTTP 响应
///
/// 状态码与 Header 在响应就绪时确定，响应体可以继续流式读取
#[derive(Debug)]
pub struct Response<B> {
    status_code: StatusCode,
    headers: HeaderMap,
    body: B,
}

impl<B: Default> Response<B> {
    /// 创建 HTTP 响应构建器
    #[inline]
    pub fn builder() -> ResponseBuilder<B> {
        ResponseBuilder::default()
    }
}

impl<B> Response<B> {
    /// 通过状态码、Headers 与响应体创建 HTTP 响应
    #[inline]
    pub fn new(status_code: StatusCode, headers: HeaderMap, body: B) -> Self {
        Self {
            status_code,
            headers,
            body,
        }
    }

    /// 获取 HTTP 状态码
    #[inline]
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    /// 获取 HTTP Headers
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 获取 HTTP Header
    #[inline]
    pub fn header(&self, header_name: HeaderName) -> Option<&HeaderValue> {
        self.headers.get(header_name)
    }

    /// 获取响应体
    #[inline]
    pub fn body(&self) -> &B {
        &self.body
    }

    /// 获取响应体的可变引用
    #[inline]
    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    /// 转换为响应体
    #[inline]
    pub fn into_body(self) -> B {
        self.body
    }

    /// 对响应体进行转换
    #[inline]
    pub fn map_body<B2>(self, f: impl FnOnce(B) -> B2) -> Response<B2> {
        let Self {
            status_code,
            headers,
            body,
        } = self;
        Response {
            status_code,
            headers,
            body: f(body),
        }
    }

    #[allow(dead_code)]
    fn ignore()
    where
        B: Send,
    {
        assert_impl!(Send: Self);
    }
}

impl<B: Default> Default for Response<B> {
    #[inline]
    fn default() -> Self {
        Self {
            status_code: StatusCode::OK,
            headers: Default::default(),
            body: Default::default(),
        }
    }
}

/// HTTP 响应构建器
#[derive(Debug, Default)]
pub struct ResponseBuilder<B> {
    inner: Response<B>,
}

impl<B: Default> ResponseBuilder<B> {
    /// 设置 HTTP 状态码
    #[inline]
    pub fn status_code(mut self, status_code: StatusCode) -> Self {
        self.inner.status_code = status_code;
        self
    }

    /// 设置 HTTP Headers
    #[inline]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.inner.headers = headers;
        self
    }

    /// 追加 HTTP Header
    #[inline]
    pub fn header(mut self, header_name: HeaderName, header_value: HeaderValue) -> Self {
        self.inner.headers.append(header_name, header_value);
        self
    }

    /// 设置响应体
    #[inline]
    pub fn body(mut self, body: B) -> Self {
        self.inner.body = body;
        self
    }

    /// 构建 HTTP 响应
    #[inline]
    pub fn build(self) -> Response<B> {
        self.inner
    }
}

/// HTTP 响应结果
pub type Result<B> = result::Result<Response<B>, Error>;
