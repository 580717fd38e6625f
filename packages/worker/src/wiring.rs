//! Builds the pipeline from configuration.

use std::sync::Arc;
use tracing::{info, warn};

use enrichment::providers::{
    Disabled, HttpAttributeWriter, ImageThumbnailGenerator, HmacLinkSigner, WebhookNotifier,
};
use enrichment::{
    AttributeWriter, BatchProcessor, Notifier, ObjectStore, PipelineStages, RecordHandler,
};

use crate::config::Config;

/// Stage implementations for this deployment.
///
/// Label detection and text extraction have no bundled provider and run
/// disabled; the write-back and notifier are disabled when unconfigured.
pub fn build_stages(config: &Config, store: Arc<dyn ObjectStore>) -> PipelineStages {
    let client = reqwest::Client::new();

    let attributes: Arc<dyn AttributeWriter> = match config.document_store() {
        Some(document_store) => Arc::new(
            HttpAttributeWriter::new(&document_store, config.pipeline_config().attributes)
                .with_client(client.clone()),
        ),
        None => {
            warn!("FORMKIQ_BASE_URL or FORMKIQ_API_KEY not set, document write-back disabled");
            Arc::new(Disabled)
        }
    };

    let notifier: Arc<dyn Notifier> = match config.notification() {
        Some(settings) => {
            let signer = Arc::new(HmacLinkSigner::new(
                settings.link_base_url,
                settings.link_signing_secret,
            ));
            Arc::new(WebhookNotifier::new(settings.webhook_url, signer).with_client(client))
        }
        None => {
            warn!("SLACK_WEBHOOK_URL, LINK_BASE_URL or LINK_SIGNING_SECRET not set, notifications disabled");
            Arc::new(Disabled)
        }
    };

    info!("label detection and text extraction have no provider, running disabled");

    PipelineStages::new(
        Arc::new(ImageThumbnailGenerator::new(
            store,
            config.resize_bucket_name.clone(),
        )),
        Arc::new(Disabled),
        Arc::new(Disabled),
        attributes,
        notifier,
    )
}

/// The batch processor the worker drives.
pub fn build_processor(config: &Config, store: Arc<dyn ObjectStore>) -> BatchProcessor {
    let handler = RecordHandler::new(build_stages(config, store), config.pipeline_config());
    BatchProcessor::new(Arc::new(handler)).with_config(config.processor_config())
}
