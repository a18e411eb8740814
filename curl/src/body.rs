use super::queues::AgentQueues;
use log::debug;
use std::{
    cmp::min,
    collections::VecDeque,
    fmt,
    io::{Read, Result as IoResult},
    sync::{
        atomic::{
            AtomicBool, AtomicUsize,
            Ordering::{Acquire, Relaxed, Release},
        },
        Arc, Condvar, Mutex, MutexGuard,
    },
};

/// 触发暂停的缺省缓冲字节数
pub(crate) const DEFAULT_MAX_BUFFERED_BYTES: usize = 6000;

/// 创建一对流式响应体读写端
///
/// 写入端只被 I/O 线程持有，读取端交给调用方线程
pub(crate) fn pipe(max_buffered: usize) -> (BodyWriter, ResponseBody) {
    let shared = Arc::new(Shared {
        state: Mutex::new(BufferState {
            segments: VecDeque::new(),
            offset: 0,
            paused: false,
            reader_dropped: false,
        }),
        data_cond: Condvar::new(),
        done_cond: Condvar::new(),
        readable: AtomicUsize::new(0),
        // 阈值为 0 会让管道永远暂停
        max_buffered: AtomicUsize::new(max_buffered.max(1)),
        done: AtomicBool::new(false),
        ready: AtomicBool::new(false),
        resume: Mutex::new(None),
    });
    (
        BodyWriter {
            shared: shared.to_owned(),
        },
        ResponseBody { shared },
    )
}

struct BufferState {
    segments: VecDeque<Vec<u8>>,
    offset: usize,
    paused: bool,
    reader_dropped: bool,
}

struct Shared {
    state: Mutex<BufferState>,
    data_cond: Condvar,
    done_cond: Condvar,
    readable: AtomicUsize,
    max_buffered: AtomicUsize,
    done: AtomicBool,
    ready: AtomicBool,
    resume: Mutex<Option<ResumeSignal>>,
}

struct ResumeSignal {
    queues: Arc<AgentQueues>,
    token: usize,
}

impl Shared {
    fn request_resume(&self) {
        if let Some(signal) = self.resume.lock().unwrap().as_ref() {
            debug!("request resume for transfer {}", signal.token);
            signal.queues.request_resume(signal.token);
        }
    }

    fn close(&self) {
        let _state = self.state.lock().unwrap();
        self.done.store(true, Release);
        self.data_cond.notify_all();
        self.done_cond.notify_all();
    }
}

/// 每次写入的结果
pub(crate) enum WriteOutcome {
    /// 数据已入缓冲
    Written,
    /// 缓冲达到暂停阈值，未写入
    Full,
    /// 读取端已被丢弃，未写入
    ReaderGone,
}

/// 流式响应体的写入端
pub(crate) struct BodyWriter {
    shared: Arc<Shared>,
}

impl BodyWriter {
    /// 写入一段响应体数据
    ///
    /// 写入不阻塞：达到暂停阈值时拒绝写入并记录暂停状态，
    /// 由读取端发出恢复信号后继续
    pub(crate) fn try_write(&self, data: &[u8]) -> WriteOutcome {
        let mut state = self.shared.state.lock().unwrap();
        if state.reader_dropped {
            return WriteOutcome::ReaderGone;
        }
        if self.shared.readable.load(Relaxed) >= self.shared.max_buffered.load(Relaxed) {
            state.paused = true;
            return WriteOutcome::Full;
        }
        state.segments.push_back(data.to_owned());
        self.shared.readable.fetch_add(data.len(), Release);
        self.shared.data_cond.notify_all();
        WriteOutcome::Written
    }

    /// 标记状态码与 Headers 已经就绪
    #[inline]
    pub(crate) fn mark_ready(&self) {
        self.shared.ready.store(true, Release);
    }

    #[inline]
    pub(crate) fn is_ready(&self) -> bool {
        self.shared.ready.load(Acquire)
    }

    /// 生产端正常结束，之后不会再有数据写入
    #[inline]
    pub(crate) fn finish(&self) {
        self.shared.close();
    }

    /// 传输失败或客户端停止，唤醒所有阻塞的读取方
    ///
    /// 已缓冲的数据仍然可读，读完后返回 EOF
    pub(crate) fn abort(&self) {
        debug!("response body aborted");
        self.shared.close();
    }

    /// 注册恢复信号的投递目标，在传输注册到多路复用器时调用
    pub(crate) fn install_resume(&self, queues: Arc<AgentQueues>, token: usize) {
        *self.shared.resume.lock().unwrap() = Some(ResumeSignal { queues, token });
    }
}

/// 流式响应体
///
/// 读取端，读取阻塞直到有数据或生产端结束
pub struct ResponseBody {
    shared: Arc<Shared>,
}

impl ResponseBody {
    /// 获取当前已缓冲未读取的字节数
    #[inline]
    pub fn readable_bytes(&self) -> usize {
        self.shared.readable.load(Acquire)
    }

    /// 阻塞直到响应体完整接收
    ///
    /// 暂停阈值被提升为无限，I/O 线程持续接收剩余数据，
    /// 已缓冲的数据在返回后仍然可读
    pub fn wait_for_done(&self) {
        self.shared.max_buffered.store(usize::MAX, Release);
        let mut state = self.shared.state.lock().unwrap();
        if state.paused {
            state.paused = false;
            self.shared.request_resume();
        }
        while !self.shared.done.load(Acquire) {
            state = self.shared.done_cond.wait(state).unwrap();
        }
    }

    fn copy_out(&self, state: &mut MutexGuard<'_, BufferState>, buf: &mut [u8]) -> usize {
        let limit = min(
            min(buf.len(), self.shared.readable.load(Relaxed)),
            self.shared.max_buffered.load(Relaxed),
        );
        let mut copied = 0;
        while copied < limit {
            let (n, front_len) = {
                let Some(front) = state.segments.front() else {
                    break;
                };
                let n = min(front.len() - state.offset, limit - copied);
                buf[copied..copied + n].copy_from_slice(&front[state.offset..state.offset + n]);
                copied += n;
                (n, front.len())
            };
            state.offset += n;
            if state.offset == front_len {
                state.segments.pop_front();
                state.offset = 0;
            }
        }
        self.shared.readable.fetch_sub(copied, Release);
        copied
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if self.shared.readable.load(Relaxed) > 0 {
                let copied = self.copy_out(&mut state, buf);
                if state.paused
                    && self.shared.readable.load(Relaxed)
                        < self.shared.max_buffered.load(Relaxed)
                {
                    state.paused = false;
                    self.shared.request_resume();
                }
                return Ok(copied);
            }
            if self.shared.done.load(Acquire) {
                return Ok(0);
            }
            if state.paused {
                state.paused = false;
                self.shared.request_resume();
            }
            state = self.shared.data_cond.wait(state).unwrap();
        }
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.reader_dropped = true;
        if state.paused {
            state.paused = false;
            self.shared.request_resume();
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("readable_bytes", &self.readable_bytes())
            .field("done", &self.shared.done.load(Relaxed))
            .finish()
    }
}
