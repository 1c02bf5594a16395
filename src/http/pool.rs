use crate::http::connector::Destination;
use crate::http::stream::RequestSlot;
use bytes::Bytes;
use http_body_util::Full;
use hyper::client::conn::http1::SendRequest;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::timeout;

/// How long a checkout waits for an idle connection to finish its previous
/// exchange before dialing a new one instead.
const READY_WAIT: Duration = Duration::from_millis(100);

const MAX_IDLE_PER_HOST: usize = 8;

pub(crate) struct PooledConn {
    pub(crate) sender: SendRequest<Full<Bytes>>,
    pub(crate) slot: RequestSlot,
}

/// Keep-alive connections, most recently used last.
#[derive(Default)]
pub(crate) struct Pool {
    idle: Mutex<HashMap<Destination, Vec<PooledConn>>>,
}

impl Pool {
    fn lock(&self) -> MutexGuard<'_, HashMap<Destination, Vec<PooledConn>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pop(&self, dst: &Destination) -> Option<PooledConn> {
        let mut idle = self.lock();
        let conns = idle.get_mut(dst)?;
        let conn = conns.pop();
        if conns.is_empty() {
            idle.remove(dst);
        }
        conn
    }

    /// Connections still busy after [`READY_WAIT`] stay pooled for a later
    /// checkout.
    pub(crate) async fn checkout(&self, dst: &Destination) -> Option<PooledConn> {
        let mut busy = Vec::new();
        let found = loop {
            let Some(mut conn) = self.pop(dst) else {
                break None;
            };
            if conn.sender.is_closed() {
                trace!("Dropping closed connection to {}", dst);
                continue;
            }
            match timeout(READY_WAIT, conn.sender.ready()).await {
                Ok(Ok(())) => break Some(conn),
                Ok(Err(e)) => debug!("Dropping broken connection to {}: {}", dst, e),
                Err(_) => {
                    debug!("Connection to {} still busy, not reusing it", dst);
                    busy.push(conn);
                }
            }
        };
        self.restore(dst, busy);
        found
    }

    /// Puts busy connections back behind the idle ones.
    fn restore(&self, dst: &Destination, busy: Vec<PooledConn>) {
        if busy.is_empty() {
            return;
        }
        let mut idle = self.lock();
        let conns = idle.entry(dst.clone()).or_default();
        let room = MAX_IDLE_PER_HOST.saturating_sub(conns.len());
        conns.splice(0..0, busy.into_iter().rev().take(room));
    }

    pub(crate) fn checkin(&self, dst: Destination, conn: PooledConn) {
        if conn.sender.is_closed() {
            return;
        }
        let mut idle = self.lock();
        let conns = idle.entry(dst).or_default();
        conns.push(conn);
        if conns.len() > MAX_IDLE_PER_HOST {
            conns.remove(0);
        }
    }
}
