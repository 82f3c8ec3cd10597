//! Builds and runs the ten phase graphs over a [`RoundBuffer`].
//!
//! Every graph here is fed exactly one [`Chunk`] spanning the whole
//! batch; modules still declare their own [`InputSize`]/[`NumThreads`],
//! so the engine's worker-pool machinery is genuinely exercised, but a
//! single round's phase never needs more than one inbound send since
//! nothing upstream of this crate produces slots incrementally.
//!
//! Every `run_*` function takes a `cancel` flag polled while draining
//! the graph's output, so [`crate::resource_queue::ResourceQueue::kill`]
//! has something to actually cancel mid-phase.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cmix_graph::{Chunk, Graph, GraphBuilder, InputSize, Module, NumThreads, Stream};
use cmix_types::ErrorKind;
use rand::RngCore;

use crate::base_key_store::BaseKeyStore;
use crate::round_buffer::RoundBuffer;
use crate::streams::decrypt::DecryptStream;
use crate::streams::generate::GenerateStream;
use crate::streams::permute::PermuteStream;
use crate::streams::real_decrypt::RealDecryptStream;
use crate::streams::real_encrypt::RealEncryptStream;
use crate::streams::real_identify::RealIdentifyStream;
use crate::streams::real_permute::RealPermuteStream;
use crate::streams::reveal::RevealStream;
use crate::streams::share::ShareStream;
use crate::streams::strip::StripStream;

/// How often the drain loop re-checks `cancel` between output chunks.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn run_whole_batch<S: Stream + 'static>(graph: Graph<S>, cancel: &AtomicBool) -> Result<(), ErrorKind> {
    let batch_size = graph.batch_size();
    let handle = graph.run();
    if handle.send(Chunk::new(0, batch_size)).is_err() {
        return Err(ErrorKind::Fatal("graph killed before accepting input".into()));
    }
    let output = handle.close_input();

    loop {
        if cancel.load(Ordering::Acquire) {
            output.kill();
            return Err(ErrorKind::Fatal("phase cancelled by resource queue".into()));
        }
        match output.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(_chunk) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    let err = output.error();
    let joined = output.join();
    if let Some(err) = err {
        return Err(ErrorKind::Fatal(err.to_string()));
    }
    if !joined {
        return Err(ErrorKind::Fatal("a graph worker thread panicked".into()));
    }
    Ok(())
}

/// Runs `PrecompGenerate`: draws this node's own secret `z`/`z_inverse`
/// and slot permutation, then fills the per-slot key and exponent
/// buffers. The node secret and permutation are not per-slot data, so
/// they are drawn directly rather than through a chunked module.
pub fn run_generate(
    buf: Arc<RoundBuffer>,
    mut rng: Box<dyn RngCore + Send>,
    cancel: &AtomicBool,
) -> Result<(), ErrorKind> {
    generate_node_secret(&buf, &mut *rng);

    let batch_size = buf.batch_size();
    let stream = GenerateStream::new(buf, rng);
    let graph = GraphBuilder::new("PrecompGenerate", stream)
        .chain(Module::new("fill_slots", InputSize::Auto, NumThreads::Auto, |s: &GenerateStream, c| {
            s.fill_slots(c)
        }))
        .build(batch_size);
    run_whole_batch(graph, cancel)
}

/// Draws this node's own secret `z`/`z_inverse` and slot permutation.
fn generate_node_secret(buf: &RoundBuffer, rng: &mut dyn RngCore) {
    use cmix_group::{PermutationTable, mod_inverse};
    let group = buf.group();
    let z = group.random_exponent(rng);
    let z_inverse = mod_inverse(&z, group.order()).expect("random_exponent draws below q, coprime whp");
    *buf.z.lock() = z;
    *buf.z_inverse.lock() = z_inverse;
    *buf.permutation.lock() = Some(PermutationTable::random(buf.batch_size() as usize, rng));
}

/// Runs `PrecompShare`, folding `incoming` (the upstream partial cypher
/// key product, or `1` on the first node) into `CypherPublicKey`.
pub fn run_share(buf: Arc<RoundBuffer>, incoming: num_bigint::BigUint, cancel: &AtomicBool) -> Result<(), ErrorKind> {
    let stream = ShareStream::new(buf, incoming);
    let graph = GraphBuilder::new("PrecompShare", stream)
        .chain(Module::new("combine", InputSize::Auto, NumThreads::Fixed(1), |s: &ShareStream, c| {
            s.combine(c)
        }))
        .build(1);
    run_whole_batch(graph, cancel)
}

/// Runs `PrecompDecrypt`.
pub fn run_decrypt(buf: Arc<RoundBuffer>, cancel: &AtomicBool) -> Result<(), ErrorKind> {
    let batch_size = buf.batch_size();
    let stream = DecryptStream::new(buf);
    let graph = GraphBuilder::new("PrecompDecrypt", stream)
        .chain(Module::new("elgamal_message", InputSize::Auto, NumThreads::Auto, |s: &DecryptStream, c| {
            s.elgamal_message(c)
        }))
        .chain(Module::new("elgamal_ad", InputSize::Auto, NumThreads::Auto, |s: &DecryptStream, c| {
            s.elgamal_ad(c)
        }))
        .build(batch_size);
    run_whole_batch(graph, cancel)
}

/// Runs `PrecompPermute`.
pub fn run_permute(buf: Arc<RoundBuffer>, cancel: &AtomicBool) -> Result<(), ErrorKind> {
    let batch_size = buf.batch_size();
    let stream = PermuteStream::new(buf);
    let graph = GraphBuilder::new("PrecompPermute", stream)
        .chain(Module::new(
            "elgamal_permuted_keys",
            InputSize::Auto,
            NumThreads::Auto,
            |s: &PermuteStream, c| s.elgamal_permuted_keys(c),
        ))
        .chain(Module::new("permute_batch", InputSize::Auto, NumThreads::Fixed(1), |s: &PermuteStream, c| {
            s.permute_batch(c)
        }))
        .build(batch_size);
    run_whole_batch(graph, cancel)
}

/// Runs `PrecompReveal`.
pub fn run_reveal(buf: Arc<RoundBuffer>, cancel: &AtomicBool) -> Result<(), ErrorKind> {
    let batch_size = buf.batch_size();
    let stream = RevealStream::new(buf);
    let graph = GraphBuilder::new("PrecompReveal", stream)
        .chain(Module::new("reveal", InputSize::Auto, NumThreads::Auto, |s: &RevealStream, c| {
            s.reveal(c)
        }))
        .build(batch_size);
    run_whole_batch(graph, cancel)
}

/// Runs `PrecompStrip`. Last node only.
pub fn run_strip(buf: Arc<RoundBuffer>, cancel: &AtomicBool) -> Result<(), ErrorKind> {
    let batch_size = buf.batch_size();
    let stream = StripStream::new(buf);
    let graph = GraphBuilder::new("PrecompStrip", stream)
        .chain(Module::new("strip", InputSize::Auto, NumThreads::Auto, |s: &StripStream, c| s.strip(c)))
        .build(batch_size);
    run_whole_batch(graph, cancel)
}

/// Runs `RealDecrypt` over the incoming client slots.
pub fn run_real_decrypt(
    buf: Arc<RoundBuffer>,
    slots: Vec<cmix_types::wire::Slot>,
    base_keys: Arc<dyn BaseKeyStore>,
    cancel: &AtomicBool,
) -> Result<(), ErrorKind> {
    let batch_size = buf.batch_size();
    let stream = RealDecryptStream::new(buf, slots, base_keys);
    let graph = GraphBuilder::new("RealDecrypt", stream)
        .chain(Module::new(
            "ingest_and_keygen",
            InputSize::Auto,
            NumThreads::Auto,
            |s: &RealDecryptStream, c| s.ingest_and_keygen(c),
        ))
        .chain(Module::new(
            "multiply_in_keys",
            InputSize::Auto,
            NumThreads::Auto,
            |s: &RealDecryptStream, c| s.multiply_in_keys(c),
        ))
        .build(batch_size);
    run_whole_batch(graph, cancel)
}

/// Runs `RealPermute`.
pub fn run_real_permute(buf: Arc<RoundBuffer>, cancel: &AtomicBool) -> Result<(), ErrorKind> {
    let batch_size = buf.batch_size();
    let stream = RealPermuteStream::new(buf);
    let graph = GraphBuilder::new("RealPermute", stream)
        .chain(Module::new(
            "multiply_in_keys",
            InputSize::Auto,
            NumThreads::Auto,
            |s: &RealPermuteStream, c| s.multiply_in_keys(c),
        ))
        .chain(Module::new("permute_batch", InputSize::Auto, NumThreads::Fixed(1), |s: &RealPermuteStream, c| {
            s.permute_batch(c)
        }))
        .build(batch_size);
    run_whole_batch(graph, cancel)
}

/// Runs `RealIdentify`. Last node only.
pub fn run_real_identify(buf: Arc<RoundBuffer>, cancel: &AtomicBool) -> Result<(), ErrorKind> {
    let batch_size = buf.batch_size();
    let stream = RealIdentifyStream::new(buf);
    let graph = GraphBuilder::new("RealIdentify", stream)
        .chain(Module::new("identify", InputSize::Auto, NumThreads::Auto, |s: &RealIdentifyStream, c| {
            s.identify(c)
        }))
        .build(batch_size);
    run_whole_batch(graph, cancel)
}

/// Runs `RealEncrypt`. Last node only.
pub fn run_real_encrypt(buf: Arc<RoundBuffer>, cancel: &AtomicBool) -> Result<(), ErrorKind> {
    let batch_size = buf.batch_size();
    let stream = RealEncryptStream::new(buf);
    let graph = GraphBuilder::new("RealEncrypt", stream)
        .chain(Module::new("encrypt", InputSize::Auto, NumThreads::Auto, |s: &RealEncryptStream, c| {
            s.encrypt(c)
        }))
        .build(batch_size);
    run_whole_batch(graph, cancel)
}
