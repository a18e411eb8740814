use super::{
    body::{pipe, BodyWriter, ResponseBody, WriteOutcome},
    easy::map_curl_error,
    header,
};
use cirro_http::{
    HeaderMap, RequestBody, Reset, Response, ResponseError, ResponseResult, StatusCode,
};
use curl::{
    easy::{Easy2, Handler, ReadError, SeekResult, WriteError},
    Error as CurlError,
};
use futures::channel::oneshot::{channel, Receiver, Sender};
use log::debug;
use std::{
    fmt,
    io::{Read, SeekFrom},
    mem::take,
    os::raw::c_long,
    ptr::null_mut,
};

/// 一次传输的内部状态
///
/// 持有完成承诺、响应体写入端与请求体，随传输注册进入多路复用器，
/// 传输完成时释放，完成承诺恰好兑现一次
pub(crate) struct TransferContext {
    sender: Option<Sender<ResponseResult<ResponseBody>>>,
    body_writer: BodyWriter,
    body_reader: Option<ResponseBody>,
    request_body: Option<RequestBody>,
    response_headers: HeaderMap,
    status_code: Option<StatusCode>,
    raw: *mut curl_sys::CURL,
}

unsafe impl Send for TransferContext {}

impl TransferContext {
    pub(crate) fn new(
        request_body: RequestBody,
        max_buffered: usize,
    ) -> (Easy2<Self>, Receiver<ResponseResult<ResponseBody>>) {
        let (sender, receiver) = channel();
        let (body_writer, body_reader) = pipe(max_buffered);
        let context = Self {
            sender: Some(sender),
            body_writer,
            body_reader: Some(body_reader),
            request_body: Some(request_body),
            response_headers: Default::default(),
            status_code: None,
            raw: null_mut(),
        };
        let mut easy = Easy2::new(context);
        let raw = easy.raw();
        easy.get_mut().raw = raw;
        (easy, receiver)
    }

    #[inline]
    pub(crate) fn body_writer(&self) -> &BodyWriter {
        &self.body_writer
    }

    #[inline]
    pub(crate) fn is_ready(&self) -> bool {
        self.body_writer.is_ready()
    }

    /// 状态码与 Headers 已知后兑现完成承诺，响应体继续独立流式接收
    fn deliver_response(&mut self) {
        if self.sender.is_none() {
            return;
        }
        if let (Some(sender), Some(body_reader)) = (self.sender.take(), self.body_reader.take()) {
            self.body_writer.mark_ready();
            let status_code = self
                .status_code
                .or_else(|| query_status_code(self.raw))
                .unwrap_or(StatusCode::OK);
            let response =
                Response::new(status_code, take(&mut self.response_headers), body_reader);
            sender.send(Ok(response)).ok();
        }
    }
}

fn query_status_code(raw: *mut curl_sys::CURL) -> Option<StatusCode> {
    if raw.is_null() {
        return None;
    }
    let mut code: c_long = 0;
    let rc =
        unsafe { curl_sys::curl_easy_getinfo(raw, curl_sys::CURLINFO_RESPONSE_CODE, &mut code) };
    if rc == curl_sys::CURLE_OK {
        StatusCode::from_u16(code as u16).ok()
    } else {
        None
    }
}

/// 传输正常完成
pub(crate) fn succeed(easy: &mut Easy2<TransferContext>) {
    let context = easy.get_mut();
    context.deliver_response();
    context.body_writer.finish();
    context.request_body = None;
}

/// 传输失败或被客户端停止强制结束
pub(crate) fn fail(easy: &mut Easy2<TransferContext>, error: ResponseError) {
    let context = easy.get_mut();
    context.body_writer.abort();
    if let Some(sender) = context.sender.take() {
        context.body_reader = None;
        sender.send(Err(error)).ok();
    }
    context.request_body = None;
}

/// 多路复用器报告传输结束时的统一入口
pub(crate) fn complete(easy: &mut Easy2<TransferContext>, error: Option<CurlError>) {
    match error {
        None => succeed(easy),
        Some(err) => fail(easy, map_curl_error(err)),
    }
}

impl Handler for TransferContext {
    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        self.deliver_response();
        match self.body_writer.try_write(data) {
            WriteOutcome::Written => Ok(data.len()),
            WriteOutcome::Full => Err(WriteError::Pause),
            WriteOutcome::ReaderGone => Ok(0),
        }
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize, ReadError> {
        let Some(request_body) = self.request_body.as_mut() else {
            return Ok(0);
        };
        match request_body.read(data) {
            Ok(0) => {
                // 请求体发送完毕，立即释放
                self.request_body = None;
                Ok(0)
            }
            Ok(len) => Ok(len),
            Err(err) => {
                debug!("request body read failed: {}", err);
                Err(ReadError::Abort)
            }
        }
    }

    fn seek(&mut self, whence: SeekFrom) -> SeekResult {
        match (whence, self.request_body.as_mut()) {
            (SeekFrom::Start(0), Some(request_body)) => request_body
                .reset()
                .map_or(SeekResult::Fail, |_| SeekResult::Ok),
            _ => SeekResult::CantSeek,
        }
    }

    fn header(&mut self, line: &[u8]) -> bool {
        if header::is_ended_line(line) {
            self.deliver_response();
            true
        } else if header::is_status_line(line) {
            if let Some(status_code) = header::parse_status_line(line) {
                self.status_code.get_or_insert(status_code);
            }
            true
        } else if let Some((header_name, header_value)) = header::parse_header_line(line) {
            self.response_headers.append(header_name, header_value);
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for TransferContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferContext")
            .field("delivered", &self.sender.is_none())
            .field("status_code", &self.status_code)
            .finish()
    }
}
