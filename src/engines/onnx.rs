//! ONNX Runtime session construction shared by the engines.

use std::path::Path;

#[cfg(feature = "cuda")]
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;

/// Device new sessions run on: `"cuda"` when the crate is built with the
/// `cuda` feature and the provider is usable, otherwise `"cpu"`.
pub fn execution_provider() -> &'static str {
    #[cfg(feature = "cuda")]
    let cuda = CUDAExecutionProvider::default()
        .is_available()
        .unwrap_or(false);
    #[cfg(not(feature = "cuda"))]
    let cuda = false;

    if cuda {
        "cuda"
    } else {
        "cpu"
    }
}

/// Providers in order of preference. ORT falls back to the next entry when
/// one cannot be registered, and CPU is always last.
fn execution_providers() -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    #[cfg(feature = "cuda")]
    providers.push(CUDAExecutionProvider::default().build());
    providers.push(CPUExecutionProvider::default().build());
    providers
}

/// Open an ONNX session with optional on-disk graph caching.
///
/// With a cache path, the first load runs Level3 optimization and writes the
/// optimized graph there; later loads read that file with optimization
/// disabled, which skips several seconds of startup work.
pub(crate) fn init_session(
    onnx_path: &Path,
    num_threads: Option<usize>,
    optimized_cache_path: Option<&Path>,
) -> ort::Result<Session> {
    let providers = execution_providers();

    let (load_path, opt_level, write_cache) = match optimized_cache_path {
        Some(cache) if cache.exists() => {
            log::info!(
                "Loading pre-optimized graph ({:.1} MB) from {}",
                cache
                    .metadata()
                    .map(|m| m.len() as f64 / 1_048_576.0)
                    .unwrap_or(0.0),
                cache.display()
            );
            (cache, GraphOptimizationLevel::Disable, None)
        }
        Some(cache) => {
            log::info!(
                "First load of {}: optimizing graph into {}",
                onnx_path.display(),
                cache.display()
            );
            (onnx_path, GraphOptimizationLevel::Level3, Some(cache))
        }
        None => (onnx_path, GraphOptimizationLevel::Level3, None),
    };

    let mut builder = Session::builder()?
        .with_optimization_level(opt_level)?
        .with_execution_providers(providers)?
        .with_parallel_execution(true)?;

    if let Some(cache) = write_cache {
        if let Some(parent) = cache.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Cannot create graph cache dir {}: {e}", parent.display());
            }
        }
        builder = builder.with_optimized_model_path(cache)?;
    }

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    builder.commit_from_file(load_path)
}
