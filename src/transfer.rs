/// Source-side click action: extract, then hand off to the background
use log::info;

use crate::config::SourceSite;
use crate::error::TransferError;
use crate::extract::{Strategy, extract};
use crate::messaging::{Fetcher, Messenger, hand_off};
use crate::page::PageContext;

/// Extraction runs to completion before anything is published, and the
/// destination opens only after the publish was acknowledged.
pub async fn transfer<F: Fetcher, M: Messenger>(
    page: &dyn PageContext,
    site: &SourceSite,
    fetcher: &F,
    messenger: &M,
    destination_url: &str,
) -> Result<Strategy, TransferError> {
    let extraction = extract(page, site, fetcher)
        .await
        .ok_or(TransferError::NothingFound)?;

    if extraction.payload.is_position_stub() {
        info!("Only a position was found on {}; sending a stub", site.name);
    }
    hand_off(messenger, &extraction.payload, destination_url).await?;
    info!(
        "Handed off notation from {} ({:?}) to {}",
        site.name, extraction.strategy, destination_url
    );
    Ok(extraction.strategy)
}
