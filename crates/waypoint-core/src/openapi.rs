//! Merging of per-plugin OpenAPI documents

use utoipa::openapi::OpenApi;

/// Merges `schemas` into `base`: paths, component schemas/responses, tags.
/// On a path collision the later schema wins.
pub fn merge_openapi_schemas(mut base: OpenApi, schemas: Vec<OpenApi>) -> OpenApi {
    for schema in schemas {
        base.paths.paths.extend(schema.paths.paths);

        if let Some(components) = schema.components {
            let base_components = base.components.get_or_insert_with(Default::default);
            base_components.schemas.extend(components.schemas);
            base_components.responses.extend(components.responses);
        }

        if let Some(tags) = schema.tags {
            base.tags.get_or_insert_with(Vec::new).extend(tags);
        }
    }

    base
}
