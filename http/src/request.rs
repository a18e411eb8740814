use super::{
    error::{Error, ErrorKind},
    Reset,
};
use http::{
    header::{HeaderMap, HeaderValue, IntoHeaderName, HOST},
    method::Method,
    uri::{Authority, PathAndQuery, Scheme, Uri},
};
use std::mem::take;

/// HTTP 请求
///
/// 封装一次请求的方法、URL、Header 与请求体，提交后除提交时的
/// URL 归一化外不再变更
#[derive(Debug, Default)]
pub struct Request {
    method: Method,
    url: Uri,
    headers: HeaderMap,
    body: RequestBody,
}

impl Request {
    /// 创建 HTTP 请求构建器
    #[inline]
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// 获取请求 HTTP 方法
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// 获取请求 URL
    #[inline]
    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// 获取请求 HTTP Headers
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 获取请求 HTTP Headers 的可变引用
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// 获取请求体
    #[inline]
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// 获取请求体的可变引用
    #[inline]
    pub fn body_mut(&mut self) -> &mut RequestBody {
        &mut self.body
    }

    /// 取出请求体，原请求体被置为空
    #[inline]
    pub fn take_body(&mut self) -> RequestBody {
        take(&mut self.body)
    }

    /// 提交时的 URL 归一化
    ///
    /// 缺省协议补为 `http`，URL 未携带主机时从 `Host` Header 推导，
    /// 缺省路径补为 `/`
    pub fn normalize(&mut self) -> Result<(), Error> {
        let mut parts = self.url.clone().into_parts();
        if parts.scheme.is_none() {
            parts.scheme = Some(Scheme::HTTP);
        }
        if parts.authority.is_none() {
            let host = self
                .headers
                .get(HOST)
                .ok_or_else(|| Error::new(ErrorKind::InvalidUrl, "request url has no host"))?;
            parts.authority = Some(
                Authority::try_from(host.as_bytes())
                    .map_err(|err| Error::new(ErrorKind::InvalidUrl, err))?,
            );
        }
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        self.url =
            Uri::from_parts(parts).map_err(|err| Error::new(ErrorKind::InvalidUrl, err))?;
        Ok(())
    }

    /// 复制请求
    ///
    /// 流式请求体不可复制，此时返回 [`None`]
    pub fn try_clone(&self) -> Option<Self> {
        Some(Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.try_clone()?,
        })
    }
}

/// HTTP 请求构建器
#[derive(Debug, Default)]
pub struct RequestBuilder {
    inner: Request,
}

impl RequestBuilder {
    /// 创建 HTTP 请求构建器
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// 设置请求 HTTP 方法
    #[inline]
    pub fn method(&mut self, method: Method) -> &mut Self {
        self.inner.method = method;
        self
    }

    /// 设置请求 URL
    #[inline]
    pub fn url(&mut self, url: Uri) -> &mut Self {
        self.inner.url = url;
        self
    }

    /// 设置请求 HTTP Headers
    #[inline]
    pub fn headers(&mut self, headers: HeaderMap) -> &mut Self {
        self.inner.headers = headers;
        self
    }

    /// 插入请求 HTTP Header
    #[inline]
    pub fn header(
        &mut self,
        header_name: impl IntoHeaderName,
        header_value: impl Into<HeaderValue>,
    ) -> &mut Self {
        self.inner.headers.append(header_name, header_value.into());
        self
    }

    /// 设置请求体
    #[inline]
    pub fn body(&mut self, body: impl Into<RequestBody>) -> &mut Self {
        self.inner.body = body.into();
        self
    }

    /// 构建 HTTP 请求，同时构建器被重置
    #[inline]
    pub fn build(&mut self) -> Request {
        take(&mut self.inner)
    }
}

mod body {
    use super::super::Reset;
    use assert_impl::assert_impl;
    use std::{
        fmt::Debug,
        io::{Cursor, Read, Result as IoResult},
    };

    trait ReadDebug: Read + Reset + Debug + Send {}
    impl<T: Read + Reset + Debug + Send> ReadDebug for T {}

    /// HTTP 请求体
    #[derive(Debug)]
    pub struct RequestBody(RequestBodyInner);

    #[derive(Debug)]
    enum RequestBodyInner {
        Bytes(Cursor<Vec<u8>>),
        Reader { reader: Box<dyn ReadDebug>, size: u64 },
    }

    impl RequestBody {
        /// 通过二进制数据创建 HTTP 请求体
        #[inline]
        pub fn from_bytes(bytes: Vec<u8>) -> Self {
            Self(RequestBodyInner::Bytes(Cursor::new(bytes)))
        }

        /// 通过输入流创建 HTTP 请求体
        #[inline]
        pub fn from_reader(
            reader: impl Read + Reset + Debug + Send + 'static,
            size: u64,
        ) -> Self {
            Self(RequestBodyInner::Reader {
                reader: Box::new(reader),
                size,
            })
        }

        /// 获取请求体大小
        ///
        /// 单位为字节
        #[inline]
        pub fn size(&self) -> u64 {
            match &self.0 {
                RequestBodyInner::Bytes(bytes) => bytes.get_ref().len() as u64,
                RequestBodyInner::Reader { size, .. } => *size,
            }
        }

        /// 复制请求体
        ///
        /// 仅二进制请求体可以复制，流式请求体返回 [`None`]
        pub fn try_clone(&self) -> Option<Self> {
            match &self.0 {
                RequestBodyInner::Bytes(bytes) => {
                    Some(Self::from_bytes(bytes.get_ref().to_owned()))
                }
                RequestBodyInner::Reader { .. } => None,
            }
        }

        #[allow(dead_code)]
        fn ignore() {
            assert_impl!(Send: Self);
        }
    }

    impl Default for RequestBody {
        #[inline]
        fn default() -> Self {
            Self::from_bytes(Default::default())
        }
    }

    impl Read for RequestBody {
        #[inline]
        fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
            match &mut self.0 {
                RequestBodyInner::Bytes(bytes) => bytes.read(buf),
                RequestBodyInner::Reader { reader, .. } => reader.read(buf),
            }
        }
    }

    impl Reset for RequestBody {
        #[inline]
        fn reset(&mut self) -> IoResult<()> {
            match &mut self.0 {
                RequestBodyInner::Bytes(bytes) => bytes.reset(),
                RequestBodyInner::Reader { reader, .. } => reader.reset(),
            }
        }
    }

    impl From<Vec<u8>> for RequestBody {
        #[inline]
        fn from(body: Vec<u8>) -> Self {
            Self::from_bytes(body)
        }
    }

    impl From<&[u8]> for RequestBody {
        #[inline]
        fn from(body: &[u8]) -> Self {
            Self::from_bytes(body.to_owned())
        }
    }

    impl From<&str> for RequestBody {
        #[inline]
        fn from(body: &str) -> Self {
            Self::from_bytes(body.as_bytes().to_owned())
        }
    }

    impl From<String> for RequestBody {
        #[inline]
        fn from(body: String) -> Self {
            Self::from_bytes(body.into_bytes())
        }
    }
}

pub use body::RequestBody;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fills_scheme_and_path() -> Result<(), Error> {
        let mut request = Request::builder()
            .url("cirro.cloud".parse().unwrap())
            .build();
        request.normalize()?;
        assert_eq!(request.url().scheme_str(), Some("http"));
        assert_eq!(request.url().host(), Some("cirro.cloud"));
        assert_eq!(request.url().path(), "/");
        Ok(())
    }

    #[test]
    fn test_normalize_derives_host_from_header() -> Result<(), Error> {
        let mut request = Request::builder()
            .url("/v1/status".parse().unwrap())
            .header(HOST, HeaderValue::from_static("api.cirro.cloud:8443"))
            .build();
        request.normalize()?;
        assert_eq!(request.url().host(), Some("api.cirro.cloud"));
        assert_eq!(request.url().port_u16(), Some(8443));
        assert_eq!(request.url().path(), "/v1/status");
        Ok(())
    }

    #[test]
    fn test_normalize_without_host_fails() {
        let mut request = Request::builder().url("/v1/status".parse().unwrap()).build();
        let err = request.normalize().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidUrl);
    }

    #[test]
    fn test_streaming_body_is_not_replayable() {
        use std::io::Cursor;

        let request = Request::builder()
            .body(RequestBody::from_reader(Cursor::new(vec![0u8; 16]), 16))
            .build();
        assert!(request.try_clone().is_none());

        let request = Request::builder().body("hello".as_bytes()).build();
        assert!(request.try_clone().is_some());
    }
}
