use super::{
    context::{self, TransferContext},
    queues::AgentQueues,
};
use cirro_http::{ResponseError, ResponseErrorKind};
use curl::{
    multi::{Easy2Handle, Multi, WaitFd},
    Error as CurlError, MultiError,
};
use log::{debug, info, warn};
use slab::Slab;
use std::{net::UdpSocket, sync::Arc, time::Duration};
use thiserror::Error;

/// 多路复用等待的时长上限，唤醒报文会提前打断等待
const POLL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub(crate) enum AgentError {
    #[error("Curl API error: {0}")]
    Curl(#[from] CurlError),
    #[error("Curl Multi API error: {0}")]
    Multi(#[from] MultiError),
}

pub(crate) type AgentResult<T> = Result<T, AgentError>;

/// I/O 事件循环
///
/// 独占多路复用句柄与运行中传输集合，单线程驱动全部网络 I/O
pub(crate) struct Agent {
    multi: Multi,
    queues: Arc<AgentQueues>,
    wake_socket: UdpSocket,
    requests: Slab<Easy2Handle<TransferContext>>,
}

impl Agent {
    pub(crate) fn new(multi: Multi, queues: Arc<AgentQueues>, wake_socket: UdpSocket) -> Self {
        Self {
            multi,
            queues,
            wake_socket,
            requests: Default::default(),
        }
    }

    pub(crate) fn run(mut self) -> AgentResult<()> {
        let result = self.run_loop();
        self.force_fail_remaining();
        result
    }

    fn run_loop(&mut self) -> AgentResult<()> {
        let mut wait_fds = [get_wait_fd(&self.wake_socket)];
        let mut wake_buf = [0u8; 1024];
        wait_fds[0].poll_on_read(true);

        loop {
            self.register_submissions()?;
            self.drain_resumes()?;

            if self.queues.stop_requested() {
                info!("transfer agent received stop request");
                return Ok(());
            }

            self.perform()?;
            self.multi.wait(&mut wait_fds, POLL_TIMEOUT)?;
            if wait_fds[0].received_read() {
                while self.wake_socket.recv_from(&mut wake_buf).is_ok() {}
            }
        }
    }

    fn register_submissions(&mut self) -> AgentResult<()> {
        for mut request in self.queues.take_submissions() {
            let entry = self.requests.vacant_entry();
            let token = entry.key();
            request
                .get_mut()
                .body_writer()
                .install_resume(self.queues.to_owned(), token);
            let mut handle = self.multi.add2(request)?;
            handle.set_token(token)?;
            entry.insert(handle);
            info!("begin transfer {}", token);
        }
        Ok(())
    }

    fn drain_resumes(&mut self) -> AgentResult<()> {
        for token in self.queues.take_resumes() {
            // 已完成传输的恢复请求被静默丢弃
            if let Some(handle) = self.requests.get(token) {
                debug!("unpause transfer {}", token);
                handle.unpause_write()?;
            }
        }
        Ok(())
    }

    fn perform(&mut self) -> AgentResult<()> {
        self.multi.perform()?;

        let mut finished = Vec::new();
        self.multi.messages(|message| {
            if let (Some(result), Ok(token)) = (message.result(), message.token()) {
                finished.push((token, result.err()));
            }
        });

        for (token, error) in finished {
            self.complete_transfer(token, error)?;
        }
        Ok(())
    }

    fn complete_transfer(
        &mut self,
        token: usize,
        error: Option<CurlError>,
    ) -> AgentResult<()> {
        if !self.requests.contains(token) {
            warn!("completion reported for unknown transfer {}", token);
            return Ok(());
        }
        let handle = self.requests.remove(token);
        let mut request = self.multi.remove2(handle)?;
        match &error {
            None => info!(
                "transfer {} completed (ready: {})",
                token,
                request.get_ref().is_ready()
            ),
            Some(err) => info!("transfer {} failed: {}", token, err),
        }
        context::complete(&mut request, error);
        Ok(())
    }

    fn force_fail_remaining(&mut self) {
        for mut request in self.queues.take_submissions() {
            context::fail(
                &mut request,
                ResponseError::new(
                    ResponseErrorKind::ClientClosed,
                    "client stopped before the transfer was registered",
                ),
            );
        }
        let handles: Vec<_> = self.requests.drain().collect();
        if handles.is_empty() {
            return;
        }
        info!("force-failing {} in-flight transfers", handles.len());
        for handle in handles {
            match self.multi.remove2(handle) {
                Ok(mut request) => context::fail(
                    &mut request,
                    ResponseError::new(
                        ResponseErrorKind::ClientClosed,
                        "client stopped while the transfer was in flight",
                    ),
                ),
                Err(err) => warn!("failed to deregister transfer on shutdown: {}", err),
            }
        }
    }
}

fn get_wait_fd(socket: &UdpSocket) -> WaitFd {
    let mut wait_fd = WaitFd::new();

    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        wait_fd.set_fd(socket.as_raw_fd());
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::AsRawSocket;
        wait_fd.set_fd(socket.as_raw_socket());
    }

    wait_fd
}
