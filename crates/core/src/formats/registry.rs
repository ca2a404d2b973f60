//! Runtime support lookup for catalog formats.

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::catalog::{find_format, list_formats, AudioCodec, EncodeParams, OutputFormatSpec};
use crate::engine::EngineError;
use crate::metrics;

/// Answers whether the runtime can encode a codec.
#[async_trait]
pub trait EncoderProbe: Send + Sync {
    async fn can_encode(&self, codec: AudioCodec, params: &EncodeParams)
        -> Result<bool, EngineError>;
}

/// Support result for one format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatSupport {
    pub supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FormatSupport {
    fn supported() -> Self {
        Self {
            supported: true,
            reason: None,
        }
    }

    fn unsupported(reason: impl Into<String>) -> Self {
        Self {
            supported: false,
            reason: Some(reason.into()),
        }
    }
}

/// A catalog entry together with its support result.
#[derive(Debug, Clone, Serialize)]
pub struct FormatAvailability {
    pub format: &'static OutputFormatSpec,
    pub supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

type ProbeFuture = Shared<BoxFuture<'static, bool>>;

/// Catalog plus a per-format, process-lifetime cache of probe results.
///
/// Concurrent lookups of the same unresolved format share one probe.
pub struct FormatRegistry {
    probe: Arc<dyn EncoderProbe>,
    probes: Mutex<HashMap<&'static str, ProbeFuture>>,
}

impl FormatRegistry {
    pub fn new(probe: Arc<dyn EncoderProbe>) -> Self {
        Self {
            probe,
            probes: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the catalog in declaration order.
    pub fn list_formats(&self) -> &'static [OutputFormatSpec] {
        list_formats()
    }

    /// Whether `format_id` names a catalog entry the runtime can encode.
    pub async fn is_supported(&self, format_id: &str) -> bool {
        self.support(format_id).await.supported
    }

    /// Support result for `format_id`, with a reason when unsupported.
    pub async fn support(&self, format_id: &str) -> FormatSupport {
        let Some(spec) = find_format(format_id) else {
            return FormatSupport::unsupported(format!("unknown output format '{}'", format_id));
        };
        self.support_for(spec).await
    }

    /// Every catalog entry with its support result, in catalog order.
    pub async fn list_formats_with_support(&self) -> Vec<FormatAvailability> {
        let checks = list_formats().iter().map(|spec| async move {
            let support = self.support_for(spec).await;
            FormatAvailability {
                format: spec,
                supported: support.supported,
                reason: support.reason,
            }
        });
        future::join_all(checks).await
    }

    async fn support_for(&self, spec: &'static OutputFormatSpec) -> FormatSupport {
        if spec.always_available {
            return FormatSupport::supported();
        }

        if self.pending_probe(spec).await {
            FormatSupport::supported()
        } else {
            FormatSupport::unsupported(spec.unsupported_message())
        }
    }

    /// Returns the shared probe for `spec`, starting it on first use.
    fn pending_probe(&self, spec: &'static OutputFormatSpec) -> ProbeFuture {
        let mut probes = self
            .probes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        probes
            .entry(spec.id)
            .or_insert_with(|| {
                debug!(format = spec.id, codec = %spec.codec, "Probing encoder support");
                let probe = Arc::clone(&self.probe);
                async move {
                    let supported = match probe.can_encode(spec.codec, &spec.params).await {
                        Ok(supported) => supported,
                        Err(e) => {
                            warn!(format = spec.id, error = %e, "Encoder probe failed, treating as unsupported");
                            false
                        }
                    };
                    metrics::CAPABILITY_PROBES
                        .with_label_values(&[if supported { "supported" } else { "unsupported" }])
                        .inc();
                    supported
                }
                .boxed()
                .shared()
            })
            .clone()
    }
}
