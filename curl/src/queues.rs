use super::{context::TransferContext, spin::SpinLock};
use curl::easy::Easy2;
use std::{
    io::Result as IoResult,
    mem::take,
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    sync::{
        atomic::{
            AtomicBool,
            Ordering::{Acquire, Release},
        },
        Condvar, Mutex,
    },
};

/// I/O 线程与调用方线程之间共享的队列组
///
/// 提交队列与恢复队列只在自旋锁内做交换清空操作，
/// 唤醒通过回环 UDP 报文提前打断 I/O 线程的多路复用等待
pub(crate) struct AgentQueues {
    submissions: SpinLock<Vec<Easy2<TransferContext>>>,
    resumes: SpinLock<Vec<usize>>,
    stop_requested: AtomicBool,
    stopped: Mutex<bool>,
    stopped_cond: Condvar,
    wake_socket: UdpSocket,
}

impl AgentQueues {
    pub(crate) fn new(wake_addr: SocketAddr) -> IoResult<Self> {
        let wake_socket = UdpSocket::bind((Ipv4Addr::new(127, 0, 0, 1), 0))?;
        wake_socket.set_nonblocking(true)?;
        wake_socket.connect(wake_addr)?;
        Ok(Self {
            submissions: SpinLock::new(Vec::new()),
            resumes: SpinLock::new(Vec::new()),
            stop_requested: AtomicBool::new(false),
            stopped: Mutex::new(false),
            stopped_cond: Condvar::new(),
            wake_socket,
        })
    }

    pub(crate) fn submit(&self, request: Easy2<TransferContext>) {
        self.submissions.lock().push(request);
        self.wake();
    }

    pub(crate) fn take_submissions(&self) -> Vec<Easy2<TransferContext>> {
        take(&mut *self.submissions.lock())
    }

    pub(crate) fn request_resume(&self, token: usize) {
        self.resumes.lock().push(token);
        self.wake();
    }

    pub(crate) fn take_resumes(&self) -> Vec<usize> {
        take(&mut *self.resumes.lock())
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Release);
        self.wake();
    }

    #[inline]
    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Acquire)
    }

    /// I/O 线程退出前的最后一步，唤醒所有等待停止的调用方
    pub(crate) fn mark_stopped(&self) {
        *self.stopped.lock().unwrap() = true;
        self.stopped_cond.notify_all();
    }

    pub(crate) fn wait_until_stopped(&self) {
        let mut stopped = self.stopped.lock().unwrap();
        while !*stopped {
            stopped = self.stopped_cond.wait(stopped).unwrap();
        }
    }

    fn wake(&self) {
        self.wake_socket.send(&[1]).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    fn queues() -> (AgentQueues, UdpSocket) {
        let rx_socket = UdpSocket::bind((Ipv4Addr::new(127, 0, 0, 1), 0)).unwrap();
        rx_socket.set_nonblocking(true).unwrap();
        let queues = AgentQueues::new(rx_socket.local_addr().unwrap()).unwrap();
        (queues, rx_socket)
    }

    #[test]
    fn test_resume_queue_swap_and_clear() {
        let (queues, _rx) = queues();
        queues.request_resume(1);
        queues.request_resume(7);
        queues.request_resume(7);
        assert_eq!(queues.take_resumes(), vec![1, 7, 7]);
        assert!(queues.take_resumes().is_empty());
    }

    #[test]
    fn test_stop_request_wakes_the_agent() {
        let (queues, rx) = queues();
        assert!(!queues.stop_requested());
        queues.request_stop();
        assert!(queues.stop_requested());
        let mut buf = [0u8; 16];
        let mut woken = false;
        for _ in 0..100 {
            if rx.recv_from(&mut buf).is_ok() {
                woken = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(woken);
    }

    #[test]
    fn test_wait_until_stopped_blocks_until_marked() {
        let (queues, _rx) = queues();
        let queues = Arc::new(queues);
        let waiter = {
            let queues = queues.to_owned();
            thread::spawn(move || queues.wait_until_stopped())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        queues.mark_stopped();
        waiter.join().unwrap();
    }
}
