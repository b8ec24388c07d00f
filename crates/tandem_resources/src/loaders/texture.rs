//! Textures read from disk on the blocking pool.

use std::sync::Arc;

use tracing::debug;

use crate::definition::{ResourceDefinition, TextureDefinition, TextureType};
use crate::error::ResourceResult;
use crate::loader::{LoadContext, LoadFuture, Payload, ResourceLoader};

/// Radiance HDR files start with this signature.
const RGBE_MAGIC: &[u8] = b"#?RADIANCE";
/// Some writers emit the shorter form.
const RGBE_MAGIC_SHORT: &[u8] = b"#?RGBE";

/// Undecoded texture bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    /// Debug name.
    pub name: Option<String>,
    /// File encoding.
    pub texture_type: TextureType,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Loads [`ResourceDefinition::Texture`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TextureLoader;

impl ResourceLoader for TextureLoader {
    fn load(&self, ctx: LoadContext, definition: ResourceDefinition) -> LoadFuture {
        let def = super::expect_definition!(ctx, definition, Texture);
        Box::pin(load_texture(ctx, def))
    }
}

async fn load_texture(ctx: LoadContext, def: TextureDefinition) -> ResourceResult<Payload> {
    let path = def.url.clone();
    let bytes = tokio::task::spawn_blocking(move || std::fs::read(path))
        .await
        .map_err(|e| ctx.fail(format!("read task aborted: {e}")))?
        .map_err(|e| ctx.fail(format!("{}: {e}", def.url)))?;

    if def.texture_type == TextureType::Rgbe
        && !(bytes.starts_with(RGBE_MAGIC) || bytes.starts_with(RGBE_MAGIC_SHORT))
    {
        return Err(ctx.fail(format!("{} is not a Radiance HDR file", def.url)));
    }

    debug!(id = ctx.id(), url = %def.url, len = bytes.len(), "Texture read");
    Ok(Arc::new(TextureData {
        name: def.name,
        texture_type: def.texture_type,
        bytes,
    }))
}
