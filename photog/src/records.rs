use {
    crate::metadata::{CreateOutcome, MetadataStore},
    anyhow::Result,
    chrono::Utc,
    photog_shared::{Error, NewImageRecord, Thumbnail, UpdateRequest},
    tracing::info,
};

/// Persist a new record for `digest`, titled after `name`, with the specified JPEG thumbnail.
pub async fn create(
    store: &dyn MetadataStore,
    digest: &str,
    name: &str,
    thumbnail: Vec<u8>,
) -> Result<CreateOutcome> {
    store
        .create(&NewImageRecord {
            digest: digest.to_owned(),
            name: name.to_owned(),
            title: name.to_owned(),
            uploaded: Utc::now(),
            thumbnail: Thumbnail {
                data: thumbnail,
                content_type: mime::IMAGE_JPEG.to_string(),
            },
        })
        .await
}

/// Apply `request` to the record it identifies.
///
/// The request is validated before the store is touched.
pub async fn update(store: &dyn MetadataStore, request: &UpdateRequest) -> Result<()> {
    let actions = request.actions()?;

    if store.find_by_id(request.id).await?.is_none() {
        return Err(Error::NotFound(request.id).into());
    }

    store.update_by_id(request.id, &actions).await?;

    info!("updated image {} ({:?})", request.id, actions);

    Ok(())
}
