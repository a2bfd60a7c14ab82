//! Handshake executed on every fresh connection
//!
//! The batch is built in a fixed order: `CLUSTER MYID` when the cluster id
//! is wanted, then `HELLO 3` when RESP3 is requested. Both go out as one
//! pipelined payload; the reply vector is interpreted here, while the
//! retry loop around init failures lives in the supervisor.

use bytes::Bytes;

use crate::core::config::{ClientConfig, ProtocolVersion};
use crate::core::value::RespValue;
use crate::protocol::Payload;

/// One connection's handshake plan.
#[derive(Debug)]
pub(crate) struct Handshake {
    use_cluster_id: bool,
    resp3: bool,
}

impl Handshake {
    pub(crate) fn new(config: &ClientConfig) -> Self {
        Self {
            use_cluster_id: config.use_cluster_id,
            resp3: config.resp_version == ProtocolVersion::Resp3,
        }
    }

    fn len(&self) -> usize {
        usize::from(self.use_cluster_id) + usize::from(self.resp3)
    }

    /// The pipelined handshake payload, or `None` when nothing needs to be
    /// sent and the handshake succeeds immediately.
    pub(crate) fn batch(&self) -> Option<Payload> {
        let mut parts = Vec::with_capacity(2);
        if self.use_cluster_id {
            parts.push(Payload::command(["CLUSTER", "MYID"]));
        }
        if self.resp3 {
            parts.push(Payload::command(["HELLO", "3"]));
        }
        if parts.is_empty() {
            None
        } else {
            Some(Payload::pipeline(parts))
        }
    }

    /// Interpret the reply for [`Self::batch`].
    ///
    /// Any error element fails the handshake with all error texts collected;
    /// otherwise the cluster id is taken from the first reply when it was
    /// requested.
    pub(crate) fn interpret(&self, reply: RespValue) -> Result<Option<Bytes>, Vec<String>> {
        let replies = match self.len() {
            1 => vec![reply],
            n => match reply {
                RespValue::Array(items) if items.len() == n => items,
                other => {
                    return Err(vec![format!("unexpected handshake reply shape: {other:?}")])
                }
            },
        };

        let errors: Vec<String> = replies
            .iter()
            .filter_map(|r| match r {
                RespValue::Error(e) => Some(e.clone()),
                _ => None,
            })
            .collect();
        if !errors.is_empty() {
            return Err(errors);
        }

        if self.use_cluster_id {
            match replies[0].as_bytes() {
                Ok(id) => Ok(Some(id)),
                Err(_) => Err(vec![format!(
                    "unexpected CLUSTER MYID reply: {:?}",
                    replies[0]
                )]),
            }
        } else {
            Ok(None)
        }
    }
}
