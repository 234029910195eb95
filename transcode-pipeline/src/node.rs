//! Pipeline node abstractions.
//!
//! A node is a work object: it takes one buffer at a time and returns the
//! batch of buffers it produced. Every node runs on its own named thread,
//! popping from an input queue and pushing to an output queue until it has
//! forwarded the end-of-stream buffer.

use crate::fifo::BufferFifo;
use crate::{PipelineError, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};
use transcode_core::{Buffer, BufferList};

/// Unique node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Create a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Pipeline node trait.
pub trait Node: Send {
    /// Get node name, also used for its thread.
    fn name(&self) -> &str;

    /// Process one input buffer.
    ///
    /// The zero-size end-of-stream buffer must be forwarded, after anything
    /// the node still holds.
    fn process(&mut self, input: Buffer) -> Result<BufferList>;
}

/// Buffers handled by a finished node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Buffers popped from the input queue.
    pub buffers_in: u64,
    /// Buffers pushed to the output queue, end-of-stream included.
    pub buffers_out: u64,
}

/// A node running on its own thread.
pub struct NodeHandle {
    id: NodeId,
    name: String,
    handle: JoinHandle<Result<NodeStats>>,
}

impl NodeHandle {
    /// Node identifier.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the node to finish.
    pub fn join(self) -> Result<NodeStats> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(PipelineError::stage_failed(self.name, "thread panicked")),
        }
    }
}

/// Start `node` on a thread between `input` and `output`.
///
/// On failure the node raises `cancel` and closes both queues, so its
/// neighbours wake up instead of waiting on it forever.
pub fn spawn_node<N>(
    mut node: N,
    input: Arc<BufferFifo>,
    output: Arc<BufferFifo>,
    cancel: Arc<AtomicBool>,
) -> Result<NodeHandle>
where
    N: Node + 'static,
{
    let id = NodeId::new();
    let name = node.name().to_string();
    let thread_name = name.clone();

    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            debug!(node = %thread_name, %id, "node started");
            let result = run_node(&mut node, &input, &output, &cancel);
            match &result {
                Ok(stats) => info!(
                    node = %thread_name,
                    buffers_in = stats.buffers_in,
                    buffers_out = stats.buffers_out,
                    "node finished"
                ),
                Err(e) => {
                    error!(node = %thread_name, error = %e, "node failed");
                    cancel.store(true, Ordering::Relaxed);
                    input.close();
                    output.close();
                }
            }
            result
        })
        .map_err(|e| PipelineError::stage_failed(&name, e.to_string()))?;

    Ok(NodeHandle { id, name, handle })
}

fn run_node<N: Node>(
    node: &mut N,
    input: &BufferFifo,
    output: &BufferFifo,
    cancel: &AtomicBool,
) -> Result<NodeStats> {
    let mut stats = NodeStats::default();
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(PipelineError::Aborted(node.name().to_string()));
        }
        let Some(buf) = input.pop() else {
            // closed upstream without an end-of-stream buffer
            if cancel.load(Ordering::Relaxed) {
                return Err(PipelineError::Aborted(node.name().to_string()));
            }
            return Err(PipelineError::stage_failed(
                node.name(),
                "input closed before end of stream",
            ));
        };
        stats.buffers_in += 1;

        let out = node.process(buf)?;
        let eof = out.iter().any(Buffer::is_eof);
        stats.buffers_out += out.len() as u64;
        output.push_list(out)?;
        if eof {
            return Ok(stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    impl Node for Doubler {
        fn name(&self) -> &str {
            "doubler"
        }

        fn process(&mut self, input: Buffer) -> Result<BufferList> {
            if input.is_eof() {
                return Ok(BufferList::from_head(input));
            }
            let mut second = input.dup();
            second.start += 1;
            Ok([input, second].into_iter().collect())
        }
    }

    struct Failing;

    impl Node for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn process(&mut self, _input: Buffer) -> Result<BufferList> {
            Err(PipelineError::writer("broken"))
        }
    }

    fn data(start: i64) -> Buffer {
        let mut buf = Buffer::from_bytes(vec![0; 4]);
        buf.start = start;
        buf
    }

    #[test]
    fn test_node_ids_unique() {
        assert_ne!(NodeId::new(), NodeId::new());
    }

    #[test]
    fn test_node_runs_until_eof() {
        let input = Arc::new(BufferFifo::new(4));
        let output = Arc::new(BufferFifo::new(16));
        let handle = spawn_node(
            Doubler,
            Arc::clone(&input),
            Arc::clone(&output),
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        assert_eq!(handle.name(), "doubler");

        input.push(data(0)).unwrap();
        input.push(data(10)).unwrap();
        input.push(Buffer::eof()).unwrap();

        let stats = handle.join().unwrap();
        assert_eq!(stats, NodeStats { buffers_in: 3, buffers_out: 5 });

        let starts: Vec<i64> = std::iter::from_fn(|| output.try_pop())
            .filter(|b| !b.is_eof())
            .map(|b| b.start)
            .collect();
        assert_eq!(starts, vec![0, 1, 10, 11]);
    }

    #[test]
    fn test_failure_closes_queues() {
        let input = Arc::new(BufferFifo::new(4));
        let output = Arc::new(BufferFifo::new(4));
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = spawn_node(
            Failing,
            Arc::clone(&input),
            Arc::clone(&output),
            Arc::clone(&cancel),
        )
        .unwrap();
        input.push(data(0)).unwrap();
        assert!(matches!(handle.join(), Err(PipelineError::Writer(_))));
        assert!(cancel.load(Ordering::Relaxed));
        assert!(input.is_closed());
        assert!(output.is_closed());
    }

    #[test]
    fn test_cancel_aborts() {
        let input = Arc::new(BufferFifo::new(4));
        let output = Arc::new(BufferFifo::new(4));
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = spawn_node(
            Doubler,
            Arc::clone(&input),
            Arc::clone(&output),
            Arc::clone(&cancel),
        )
        .unwrap();
        cancel.store(true, Ordering::Relaxed);
        input.close();
        assert!(matches!(handle.join(), Err(PipelineError::Aborted(_))));
    }
}
