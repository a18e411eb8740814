mod agent;
mod body;
mod context;
mod easy;
mod header;
mod queues;
mod spin;

pub use body::ResponseBody;

use agent::{Agent, AgentError, AgentResult};
use body::DEFAULT_MAX_BUFFERED_BYTES;
use cirro_http::{
    HttpCaller, Request, ResponseBody as HttpResponseBody, ResponseError, ResponseErrorKind,
    ResponseResult, RuntimeOptions,
};
use context::TransferContext;
use crossbeam_utils::sync::WaitGroup;
use curl::{easy::Easy2, init as curl_init, multi::Multi, MultiError};
use easy::{set_body, set_headers, set_method, set_options, set_url};
use futures::{channel::oneshot::Receiver, executor::block_on};
use log::{info, warn};
use queues::AgentQueues;
use std::{
    fmt,
    future::Future,
    io::Result as IoResult,
    net::{Ipv4Addr, UdpSocket},
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    thread::{Builder as ThreadBuilder, JoinHandle},
};

/// 基于 Curl 多路复用引擎的 HTTP 客户端
///
/// 一个客户端对应一个 I/O 线程，任意数量的调用方线程可以并发提交请求
#[derive(Debug)]
pub struct CurlClient {
    max_buffered_bytes: usize,
    appended_user_agent: Option<String>,
    multi_options: MultiOptions,
    inner: Mutex<Option<AgentHandle>>,
}

#[derive(Debug, Clone, Default)]
struct MultiOptions {
    max_connections: usize,
    max_connections_per_host: usize,
    connection_cache_size: usize,
}

struct AgentHandle {
    queues: Arc<AgentQueues>,
    join_handle: Option<JoinHandle<AgentResult<()>>>,
}

impl fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHandle").finish()
    }
}

impl CurlClient {
    /// 创建客户端构建器
    #[inline]
    pub fn builder() -> CurlClientBuilder {
        CurlClientBuilder::default()
    }

    /// 启动 I/O 线程
    ///
    /// 重复调用不产生新线程。唤醒套接字分配失败时客户端无法启动
    pub fn start(&self) -> IoResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_some() {
            return Ok(());
        }

        curl_init();
        let wake_socket = UdpSocket::bind((Ipv4Addr::new(127, 0, 0, 1), 0))?;
        wake_socket.set_nonblocking(true)?;
        let wake_addr = wake_socket.local_addr()?;
        let queues = Arc::new(AgentQueues::new(wake_addr)?);

        let multi_options = self.multi_options.to_owned();
        let wait_group = WaitGroup::new();
        let join_handle = {
            let queues = queues.to_owned();
            let wait_group = wait_group.to_owned();
            ThreadBuilder::new()
                .name(format!("cirro-curl/{}", wake_addr.port()))
                .spawn(move || {
                    let mut multi = Multi::new();
                    let setup = set_multi_options(&mut multi, &multi_options);
                    drop(wait_group);
                    let result = match setup {
                        Ok(()) => Agent::new(multi, queues.to_owned(), wake_socket).run(),
                        Err(err) => Err(AgentError::from(err)),
                    };
                    if let Err(err) = &result {
                        warn!("transfer agent terminated with error: {}", err);
                    }
                    queues.mark_stopped();
                    result
                })?
        };
        wait_group.wait();

        info!("transfer agent started on {}", wake_addr);
        *inner = Some(AgentHandle {
            queues,
            join_handle: Some(join_handle),
        });
        Ok(())
    }

    /// 停止 I/O 线程
    ///
    /// 所有还在进行中的传输被强制失败，阻塞直到 I/O 线程退出。
    /// 重复调用无副作用
    pub fn stop(&self) {
        let handle = self.inner.lock().unwrap().take();
        if let Some(mut handle) = handle {
            info!("stopping transfer agent");
            handle.queues.request_stop();
            handle.queues.wait_until_stopped();
            if let Some(join_handle) = handle.join_handle.take() {
                match join_handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!("transfer agent exited with error: {}", err),
                    Err(_) => warn!("transfer agent panicked"),
                }
            }
        }
    }

    /// 提交 HTTP 请求
    ///
    /// 返回的 Future 在状态码与 Headers 就绪时完成，响应体继续流式接收。
    /// 客户端未运行或请求配置失败时，Future 立即以错误完成，不会抛出
    pub fn submit(&self, mut request: Request, options: &RuntimeOptions) -> CallFuture {
        let queues = {
            let inner = self.inner.lock().unwrap();
            match inner.as_ref() {
                Some(handle) if !handle.queues.stop_requested() => handle.queues.to_owned(),
                _ => {
                    return CallFuture::ready(Err(ResponseError::new(
                        ResponseErrorKind::ClientClosed,
                        "client is not running",
                    )))
                }
            }
        };
        match self.prepare(&mut request, options) {
            Ok((easy, receiver)) => {
                queues.submit(easy);
                CallFuture::waiting(receiver)
            }
            Err(err) => CallFuture::ready(Err(err)),
        }
    }

    /// 发送 HTTP 请求并阻塞等待响应就绪
    #[inline]
    pub fn call(
        &self,
        request: Request,
        options: &RuntimeOptions,
    ) -> ResponseResult<ResponseBody> {
        block_on(self.submit(request, options))
    }

    fn prepare(
        &self,
        request: &mut Request,
        options: &RuntimeOptions,
    ) -> Result<
        (
            Easy2<TransferContext>,
            Receiver<ResponseResult<ResponseBody>>,
        ),
        ResponseError,
    > {
        request.normalize()?;
        let body_size = request.body().size();
        let (mut easy, receiver) =
            TransferContext::new(request.take_body(), self.max_buffered_bytes);
        set_method(&mut easy, request)?;
        set_url(&mut easy, request)?;
        set_headers(&mut easy, request)?;
        set_body(&mut easy, request, body_size)?;
        set_options(&mut easy, request, options, self.appended_user_agent.as_deref())?;
        Ok((easy, receiver))
    }
}

impl Default for CurlClient {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Drop for CurlClient {
    fn drop(&mut self) {
        self.stop();
    }
}

impl HttpCaller for CurlClient {
    fn call(&self, request: Request, options: &RuntimeOptions) -> ResponseResult<HttpResponseBody> {
        CurlClient::call(self, request, options)
            .map(|response| response.map_body(HttpResponseBody::from_reader))
    }
}

fn set_multi_options(multi: &mut Multi, options: &MultiOptions) -> Result<(), MultiError> {
    if options.max_connections > 0 {
        multi.set_max_total_connections(options.max_connections)?;
    }
    if options.max_connections_per_host > 0 {
        multi.set_max_host_connections(options.max_connections_per_host)?;
    }
    if options.connection_cache_size > 0 {
        multi.set_max_connects(options.connection_cache_size)?;
    }
    Ok(())
}

/// 客户端构建器
#[derive(Debug)]
pub struct CurlClientBuilder {
    max_buffered_bytes: usize,
    appended_user_agent: Option<String>,
    multi_options: MultiOptions,
}

impl Default for CurlClientBuilder {
    #[inline]
    fn default() -> Self {
        Self {
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            appended_user_agent: None,
            multi_options: Default::default(),
        }
    }
}

impl CurlClientBuilder {
    /// 设置触发暂停的响应体缓冲字节数
    #[inline]
    pub fn max_buffered_bytes(mut self, max_buffered_bytes: usize) -> Self {
        self.max_buffered_bytes = max_buffered_bytes;
        self
    }

    /// 设置追加的 UserAgent
    #[inline]
    pub fn appended_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.appended_user_agent = Some(user_agent.into());
        self
    }

    /// 设置最大并发连接数量，0 为不限制
    #[inline]
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.multi_options.max_connections = max_connections;
        self
    }

    /// 设置单主机最大并发连接数量，0 为不限制
    #[inline]
    pub fn max_connections_per_host(mut self, max_connections_per_host: usize) -> Self {
        self.multi_options.max_connections_per_host = max_connections_per_host;
        self
    }

    /// 设置连接缓存数量，0 为引擎缺省
    #[inline]
    pub fn connection_cache_size(mut self, connection_cache_size: usize) -> Self {
        self.multi_options.connection_cache_size = connection_cache_size;
        self
    }

    /// 构建客户端，构建后需要调用 [`CurlClient::start`] 启动
    pub fn build(self) -> CurlClient {
        CurlClient {
            max_buffered_bytes: self.max_buffered_bytes,
            appended_user_agent: self.appended_user_agent,
            multi_options: self.multi_options,
            inner: Mutex::new(None),
        }
    }
}

/// 请求完成 Future
///
/// 状态码与 Headers 就绪时完成，每个请求恰好完成一次
pub struct CallFuture(CallFutureInner);

enum CallFutureInner {
    Ready(Option<ResponseResult<ResponseBody>>),
    Waiting(Receiver<ResponseResult<ResponseBody>>),
}

impl CallFuture {
    fn ready(result: ResponseResult<ResponseBody>) -> Self {
        Self(CallFutureInner::Ready(Some(result)))
    }

    fn waiting(receiver: Receiver<ResponseResult<ResponseBody>>) -> Self {
        Self(CallFutureInner::Waiting(receiver))
    }
}

impl Future for CallFuture {
    type Output = ResponseResult<ResponseBody>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().0 {
            CallFutureInner::Ready(result) => match result.take() {
                Some(result) => Poll::Ready(result),
                None => Poll::Pending,
            },
            CallFutureInner::Waiting(receiver) => {
                Pin::new(receiver).poll(cx).map(|result| match result {
                    Ok(result) => result,
                    Err(_) => Err(ResponseError::new(
                        ResponseErrorKind::ClientClosed,
                        "transfer agent terminated before completing the request",
                    )),
                })
            }
        }
    }
}
