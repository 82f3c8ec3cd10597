//! The dataflow graph itself: a linear chain of modules sharing a stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::{Chunk, GraphError, InputSize, Module, Stream};
#[cfg(test)]
use crate::NumThreads;

/// Bound applied to every inter-module channel, as a multiple of the
/// downstream module's thread count. Keeps memory use proportional to
/// in-flight work while still letting a fast module build a small buffer
/// ahead of a slower one.
const CHANNEL_SLACK: usize = 4;

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}

/// Builds a [`Graph`] by chaining modules in execution order.
pub struct GraphBuilder<S: Stream> {
    name: &'static str,
    stream: Arc<S>,
    modules: Vec<Module<S>>,
}

impl<S: Stream + 'static> GraphBuilder<S> {
    /// Starts a new graph builder around the given stream.
    pub fn new(name: &'static str, stream: S) -> Self {
        Self {
            name,
            stream: Arc::new(stream),
            modules: Vec::new(),
        }
    }

    /// Appends `module` to the end of the chain.
    pub fn chain(mut self, module: Module<S>) -> Self {
        self.modules.push(module);
        self
    }

    /// Finalizes the graph for a round of `batch_size` slots.
    ///
    /// `expandedBatchSize` is the LCM of every module's fixed
    /// `input_size`, so that chunks tile evenly at every module
    /// boundary; modules with `InputSize::Auto` do not constrain it.
    /// Slots in `[batch_size, expanded_batch_size)` are padding.
    pub fn build(self, batch_size: u32) -> Graph<S> {
        let mut expanded = batch_size as u64;
        for m in &self.modules {
            if let InputSize::Fixed(n) = m.input_size() {
                expanded = lcm(expanded, n as u64);
            }
        }
        Graph {
            name: self.name,
            stream: self.stream,
            modules: self.modules,
            batch_size,
            expanded_batch_size: expanded as u32,
        }
    }
}

/// A graph ready to run: a shared stream plus a linear chain of modules.
pub struct Graph<S: Stream> {
    name: &'static str,
    stream: Arc<S>,
    modules: Vec<Module<S>>,
    batch_size: u32,
    expanded_batch_size: u32,
}

impl<S: Stream + 'static> Graph<S> {
    /// The graph's name, used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The shared stream this graph's modules operate on.
    pub fn stream(&self) -> &Arc<S> {
        &self.stream
    }

    /// The round's declared batch size.
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// The padded batch size chunks are tiled over.
    pub fn expanded_batch_size(&self) -> u32 {
        self.expanded_batch_size
    }

    /// Starts one worker pool per module and returns a handle used to
    /// feed input chunks and drain output chunks.
    ///
    /// Distinct chunks never overlap by construction (the caller tiles
    /// `[0, expanded_batch_size)` without gaps or overlaps), so modules
    /// never need to coordinate with each other beyond the channel
    /// handoff: each adapter call is the sole writer of its chunk's
    /// slots for the buffers it touches.
    pub fn run(&self) -> GraphHandle {
        let killed = Arc::new(AtomicBool::new(false));
        let error = Arc::new(Mutex::new(None));

        if self.modules.is_empty() {
            let (tx, rx) = sync_channel(1);
            return GraphHandle {
                input: tx,
                output: Arc::new(Mutex::new(rx)),
                workers: Vec::new(),
                killed,
                error,
            };
        }

        let stage_capacity = |threads: usize| (threads * CHANNEL_SLACK).max(1);

        let (first_tx, mut prev_rx) = sync_channel::<Chunk>(stage_capacity(
            self.modules[0].num_threads().resolve(),
        ));
        let mut workers = Vec::new();

        for (idx, module) in self.modules.iter().enumerate() {
            let is_last = idx == self.modules.len() - 1;
            let num_threads = module.num_threads().resolve();
            let next_capacity = if is_last {
                1
            } else {
                stage_capacity(self.modules[idx + 1].num_threads().resolve())
            };
            let (next_tx, next_rx) = sync_channel::<Chunk>(next_capacity);

            let shared_rx = Arc::new(Mutex::new(prev_rx));
            let input_size = module.input_size();
            let module = module.clone();
            let stream = Arc::clone(&self.stream);
            let killed = Arc::clone(&killed);
            let error = Arc::clone(&error);
            let graph_name = self.name;

            for _ in 0..num_threads {
                let shared_rx = Arc::clone(&shared_rx);
                let next_tx = next_tx.clone();
                let module = module.clone();
                let stream = Arc::clone(&stream);
                let killed = Arc::clone(&killed);
                let error = Arc::clone(&error);

                let handle = std::thread::Builder::new()
                    .name(format!("{graph_name}/{}", module.name()))
                    .spawn(move || {
                        loop {
                            if killed.load(Ordering::Acquire) {
                                break;
                            }
                            let chunk = {
                                let rx = shared_rx.lock().unwrap();
                                rx.recv_timeout(Duration::from_millis(50))
                            };
                            let chunk = match chunk {
                                Ok(chunk) => chunk,
                                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                            };
                            if killed.load(Ordering::Acquire) {
                                break;
                            }
                            let sub_chunks = match input_size {
                                InputSize::Auto => vec![chunk],
                                InputSize::Fixed(width) => chunk.subdivide(width),
                            };
                            for sub in sub_chunks {
                                if let Err(err) = module.run_adapt(&stream, sub) {
                                    tracing::error!(
                                        graph = graph_name,
                                        module = module.name(),
                                        %err,
                                        "module adapter failed"
                                    );
                                    *error.lock().unwrap() = Some(err);
                                    killed.store(true, Ordering::Release);
                                    return;
                                }
                            }
                            if next_tx.send(chunk).is_err() {
                                break;
                            }
                        }
                    })
                    .expect("failed to spawn graph worker thread");
                workers.push(handle);
            }

            prev_rx = next_rx;
        }

        GraphHandle {
            input: first_tx,
            output: Arc::new(Mutex::new(prev_rx)),
            workers,
            killed,
            error,
        }
    }
}

/// A running graph: the channel to feed input chunks into, the channel
/// output chunks drain from, and cancellation/error state.
pub struct GraphHandle {
    input: SyncSender<Chunk>,
    output: Arc<Mutex<Receiver<Chunk>>>,
    workers: Vec<JoinHandle<()>>,
    killed: Arc<AtomicBool>,
    error: Arc<Mutex<Option<GraphError>>>,
}

impl GraphHandle {
    /// Feeds one input chunk to the first module. Blocks if the first
    /// module's channel is full (backpressure).
    pub fn send(&self, chunk: Chunk) -> Result<(), GraphError> {
        self.input.send(chunk).map_err(|_| GraphError::Killed)
    }

    /// Signals that no more input chunks will arrive. Once every
    /// in-flight chunk has drained through every module, the output
    /// channel closes and subsequent `recv_output` calls return `None`.
    pub fn close_input(self) -> GraphOutput {
        // Dropping `self.input` closes the first channel; workers exit
        // once it and all in-flight work drains.
        GraphOutput {
            output: self.output,
            workers: self.workers,
            killed: self.killed,
            error: self.error,
        }
    }

    /// Cancels the graph: all workers observe `killed` and stop
    /// processing further chunks, discarding anything in flight.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }

    /// `true` iff the graph has been killed (by timeout, error, or an
    /// explicit `kill()`).
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }
}

/// The drainable, tail end of a [`GraphHandle`] after input has been
/// closed.
pub struct GraphOutput {
    output: Arc<Mutex<Receiver<Chunk>>>,
    workers: Vec<JoinHandle<()>>,
    killed: Arc<AtomicBool>,
    error: Arc<Mutex<Option<GraphError>>>,
}

impl GraphOutput {
    /// Blocks until the next completed chunk is available, or returns
    /// `None` once every module has drained and shut down.
    pub fn recv(&self) -> Option<Chunk> {
        let rx = self.output.lock().unwrap();
        rx.recv().ok()
    }

    /// Blocks up to `timeout` for the next completed chunk.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Chunk, std::sync::mpsc::RecvTimeoutError> {
        let rx = self.output.lock().unwrap();
        rx.recv_timeout(timeout)
    }

    /// Cancels the graph and waits for every worker thread to exit.
    pub fn kill(self) -> bool {
        self.killed.store(true, Ordering::Release);
        self.join()
    }

    /// Joins every worker thread. Returns `true` if all joined cleanly.
    pub fn join(self) -> bool {
        let mut ok = true;
        for w in self.workers {
            if w.join().is_err() {
                ok = false;
            }
        }
        ok
    }

    /// The first adapter error observed, if any.
    pub fn error(&self) -> Option<GraphError> {
        self.error.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU32;

    struct CountingStream {
        touched: AtomicU32,
    }

    impl Stream for CountingStream {
        fn get_name(&self) -> &'static str {
            "CountingStream"
        }
    }

    #[test]
    fn every_slot_emerges_exactly_once() {
        let stream = CountingStream {
            touched: AtomicU32::new(0),
        };
        let module = Module::new(
            "noop",
            InputSize::Fixed(4),
            NumThreads::Fixed(2),
            |s: &CountingStream, chunk: Chunk| {
                s.touched.fetch_add(chunk.len(), Ordering::Relaxed);
                Ok(())
            },
        );
        let graph = GraphBuilder::new("test", stream).chain(module).build(16);
        assert_eq!(graph.expanded_batch_size(), 16);
        let handle = graph.run();
        for c in Chunk::new(0, 16).subdivide(4) {
            handle.send(c).unwrap();
        }
        let output = handle.close_input();
        let mut seen = HashSet::new();
        let mut total = 0u32;
        while let Some(chunk) = output.recv() {
            for i in chunk.begin()..chunk.end() {
                assert!(seen.insert(i), "slot {i} emitted twice");
            }
            total += chunk.len();
        }
        assert_eq!(total, 16);
        output.join();
    }

    #[test]
    fn chain_runs_modules_in_order() {
        struct OrderStream {
            order: Mutex<Vec<&'static str>>,
        }
        impl Stream for OrderStream {
            fn get_name(&self) -> &'static str {
                "OrderStream"
            }
        }
        let stream = OrderStream {
            order: Mutex::new(Vec::new()),
        };
        let first = Module::new(
            "first",
            InputSize::Auto,
            NumThreads::Fixed(1),
            |s: &OrderStream, _chunk| {
                s.order.lock().unwrap().push("first");
                Ok(())
            },
        );
        let second = Module::new(
            "second",
            InputSize::Auto,
            NumThreads::Fixed(1),
            |s: &OrderStream, _chunk| {
                s.order.lock().unwrap().push("second");
                Ok(())
            },
        );
        let graph = GraphBuilder::new("chain", stream)
            .chain(first)
            .chain(second)
            .build(4);
        let stream_handle = Arc::clone(graph.stream());
        let handle = graph.run();
        handle.send(Chunk::new(0, 4)).unwrap();
        let output = handle.close_input();
        assert!(output.recv().is_some());
        output.join();
        assert_eq!(*stream_handle.order.lock().unwrap(), vec!["first", "second"]);
    }
}
