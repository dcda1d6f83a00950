//! Request handlers, one per method

use super::encoding::{ElementPayload, MeshPayload, TilePayload};
use super::protocol::{error_codes, Request, Response};
use super::state::ServerState;
use crate::config::Config;
use crate::context::MapContext;
use crate::extract::CollectingSink;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};

type Id = Option<serde_json::Value>;

/// Parse and answer one input line; blank lines get no response
pub fn handle_line(state: &mut ServerState, line: &str) -> Option<Response> {
    if line.trim().is_empty() {
        return None;
    }
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Unparseable request line");
            return Some(Response::error(None, error_codes::PARSE_ERROR, format!("Parse error: {}", e)));
        }
    };
    let id = value.get("id").cloned();
    match serde_json::from_value::<Request>(value) {
        Ok(request) => Some(handle_request(state, request)),
        Err(e) => Some(Response::error(id, error_codes::INVALID_REQUEST, format!("Invalid request: {}", e))),
    }
}

pub fn handle_request(state: &mut ServerState, request: Request) -> Response {
    let Request { id, method, params } = request;
    match method.as_str() {
        "Configure" => handle_configure(state, id, params),
        "RegisterElementBuilder" => handle_register_element_builder(state, id, params),
        "AddToStoreInRange" => handle_add_in_range(state, id, params),
        "AddToStoreInQuadKey" => handle_add_in_quadkey(state, id, params),
        "HasData" => handle_has_data(state, id, params),
        "LoadQuadKey" => handle_load_quad_key(state, id, params),
        "LoadQuadKeys" => handle_load_quad_keys(state, id, params),
        "Cleanup" => handle_cleanup(state, id),
        other => Response::error(id, error_codes::METHOD_NOT_FOUND, format!("Unknown method: {}", other)),
    }
}

fn parse_params<T: DeserializeOwned>(id: &Id, params: Option<serde_json::Value>, expected: &str) -> Result<T, Response> {
    params
        .and_then(|p| serde_json::from_value(p).ok())
        .ok_or_else(|| {
            Response::error(
                id.clone(),
                error_codes::INVALID_PARAMS,
                format!("Invalid params: expected {}", expected),
            )
        })
}

fn context<'a>(state: &'a ServerState, id: &Id) -> Result<&'a MapContext, Response> {
    state
        .context
        .as_ref()
        .ok_or_else(|| Response::error(id.clone(), error_codes::NOT_CONFIGURED, "Configure has not been called"))
}

pub fn handle_configure(state: &mut ServerState, id: Id, params: Option<serde_json::Value>) -> Response {
    let config: Config = match parse_params(&id, params, "{stringsDir, dataDir, elevationDir, persistStrings?}") {
        Ok(c) => c,
        Err(response) => return response,
    };

    // a new configuration starts from an empty store
    if let Some(previous) = state.context.take() {
        previous.cleanup();
    }
    match MapContext::configure(config) {
        Ok(context) => {
            state.context = Some(context);
            Response::success(id, json!({ "status": "ok" }))
        }
        Err(e) => Response::error(id, error_codes::CONFIG_FAILED, e.to_string()),
    }
}

pub fn handle_register_element_builder(state: &mut ServerState, id: Id, params: Option<serde_json::Value>) -> Response {
    #[derive(Deserialize)]
    struct RegisterParams {
        name: String,
    }

    let params: RegisterParams = match parse_params(&id, params, "{name: string}") {
        Ok(p) => p,
        Err(response) => return response,
    };
    let context = match context(state, &id) {
        Ok(c) => c,
        Err(response) => return response,
    };
    context.register_element_builder(&params.name);
    Response::success(id, json!({ "status": "ok", "builders": context.registry().names() }))
}

pub fn handle_add_in_range(state: &mut ServerState, id: Id, params: Option<serde_json::Value>) -> Response {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RangeParams {
        stylesheet: String,
        data: String,
        start_lod: u8,
        end_lod: u8,
    }

    let params: RangeParams = match parse_params(&id, params, "{stylesheet, data, startLod, endLod}") {
        Ok(p) => p,
        Err(response) => return response,
    };
    let context = match context(state, &id) {
        Ok(c) => c,
        Err(response) => return response,
    };

    let mut errors = Vec::new();
    match context.add_to_in_memory_store_in_range(
        &params.stylesheet,
        &params.data,
        params.start_lod,
        params.end_lod,
        |e| errors.push(e.to_string()),
    ) {
        Ok(summary) => Response::success(
            id,
            json!({
                "parsed": summary.parsed,
                "unstyled": summary.unstyled,
                "stored": summary.stored,
                "rejected": summary.rejected,
                "errors": errors,
            }),
        ),
        Err(e) => Response::error(id, error_codes::INGEST_FAILED, e.to_string()),
    }
}

pub fn handle_add_in_quadkey(state: &mut ServerState, id: Id, params: Option<serde_json::Value>) -> Response {
    #[derive(Deserialize)]
    struct QuadKeyParams {
        stylesheet: String,
        data: String,
        x: u32,
        y: u32,
        lod: u8,
    }

    let params: QuadKeyParams = match parse_params(&id, params, "{stylesheet, data, x, y, lod}") {
        Ok(p) => p,
        Err(response) => return response,
    };
    let context = match context(state, &id) {
        Ok(c) => c,
        Err(response) => return response,
    };

    let mut errors = Vec::new();
    match context.add_to_in_memory_store_in_quadkey(
        &params.stylesheet,
        &params.data,
        params.x,
        params.y,
        params.lod,
        |e| errors.push(e.to_string()),
    ) {
        Ok(summary) => Response::success(
            id,
            json!({
                "parsed": summary.parsed,
                "unstyled": summary.unstyled,
                "skipped": summary.skipped,
                "stored": summary.stored,
                "rejected": summary.rejected,
                "errors": errors,
            }),
        ),
        Err(e) => Response::error(id, error_codes::INGEST_FAILED, e.to_string()),
    }
}

pub fn handle_has_data(state: &mut ServerState, id: Id, params: Option<serde_json::Value>) -> Response {
    #[derive(Deserialize)]
    struct TileParams {
        x: u32,
        y: u32,
        lod: u8,
    }

    let params: TileParams = match parse_params(&id, params, "{x, y, lod}") {
        Ok(p) => p,
        Err(response) => return response,
    };
    let context = match context(state, &id) {
        Ok(c) => c,
        Err(response) => return response,
    };
    Response::success(id, json!({ "hasData": context.has_data(params.x, params.y, params.lod) }))
}

pub fn handle_load_quad_key(state: &mut ServerState, id: Id, params: Option<serde_json::Value>) -> Response {
    #[derive(Deserialize)]
    struct LoadParams {
        stylesheet: String,
        x: u32,
        y: u32,
        lod: u8,
    }

    #[derive(Serialize)]
    struct LoadResult<'a> {
        meshes: Vec<MeshPayload<'a>>,
        elements: Vec<ElementPayload<'a>>,
        errors: Vec<String>,
    }

    let params: LoadParams = match parse_params(&id, params, "{stylesheet, x, y, lod}") {
        Ok(p) => p,
        Err(response) => return response,
    };
    let context = match context(state, &id) {
        Ok(c) => c,
        Err(response) => return response,
    };

    let start = Instant::now();
    let mut sink = CollectingSink::default();
    let LoadParams { stylesheet, x, y, lod } = params;
    if let Err(e) = context.load_quad_key(&stylesheet, x, y, lod, &mut sink) {
        return Response::error(id, error_codes::EXTRACTION_FAILED, e.to_string());
    }
    info!(
        x,
        y,
        lod,
        meshes = sink.meshes.len(),
        elements = sink.elements.len(),
        errors = sink.errors.len(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "LoadQuadKey"
    );

    let result = LoadResult {
        meshes: sink.meshes.iter().map(MeshPayload::from).collect(),
        elements: sink.elements.iter().map(ElementPayload::from).collect(),
        errors: sink.errors.iter().map(|e| e.to_string()).collect(),
    };
    Response::typed(id, &result)
}

pub fn handle_load_quad_keys(state: &mut ServerState, id: Id, params: Option<serde_json::Value>) -> Response {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RangeParams {
        stylesheet: String,
        lod: u8,
        min_x: u32,
        max_x: u32,
        min_y: u32,
        max_y: u32,
    }

    let params: RangeParams = match parse_params(&id, params, "{stylesheet, lod, minX, maxX, minY, maxY}") {
        Ok(p) => p,
        Err(response) => return response,
    };
    let context = match context(state, &id) {
        Ok(c) => c,
        Err(response) => return response,
    };

    match context.load_tile_range(
        &params.stylesheet,
        params.lod,
        params.min_x..=params.max_x,
        params.min_y..=params.max_y,
    ) {
        Ok(tiles) => {
            #[derive(Serialize)]
            struct RangeResult<'a> {
                tiles: Vec<TilePayload<'a>>,
            }

            let result = RangeResult {
                tiles: tiles.iter().map(TilePayload::from).collect(),
            };
            Response::typed(id, &result)
        }
        Err(e) => Response::error(id, error_codes::EXTRACTION_FAILED, e.to_string()),
    }
}

pub fn handle_cleanup(state: &mut ServerState, id: Id) -> Response {
    match state.context.take() {
        Some(context) => {
            context.cleanup();
            Response::success(id, json!({ "status": "ok" }))
        }
        None => Response::error(id, error_codes::NOT_CONFIGURED, "Configure has not been called"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn call(state: &mut ServerState, line: &str) -> serde_json::Value {
        let response = handle_line(state, line).unwrap();
        serde_json::to_value(response).unwrap()
    }

    #[test]
    fn test_not_configured_and_unknown_method() {
        let mut state = ServerState::new();
        let response = call(&mut state, r#"{"id":1,"method":"HasData","params":{"x":0,"y":0,"lod":0}}"#);
        assert_eq!(response["error"]["code"], error_codes::NOT_CONFIGURED);

        let response = call(&mut state, r#"{"id":2,"method":"Render"}"#);
        assert_eq!(response["error"]["code"], error_codes::METHOD_NOT_FOUND);

        let response = call(&mut state, "{not json");
        assert_eq!(response["error"]["code"], error_codes::PARSE_ERROR);

        assert!(handle_line(&mut state, "   ").is_none());
    }

    #[test]
    fn test_session() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("style.mapcss"),
            "node[place] { builder: place; label-tag: name; }",
        )
        .unwrap();
        fs::write(
            dir.path().join("places.geojson"),
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","id":4,"properties":{"place":"city","name":"Berlin"},
                 "geometry":{"type":"Point","coordinates":[13.389,52.531]}}]}"#,
        )
        .unwrap();

        let root = dir.path().display().to_string().replace('\\', "/");
        let mut state = ServerState::new();
        let configure = format!(
            r#"{{"id":1,"method":"Configure","params":{{"stringsDir":"{0}","dataDir":"{0}","elevationDir":"{0}","persistStrings":false}}}}"#,
            root
        );
        assert_eq!(call(&mut state, &configure)["result"]["status"], "ok");
        call(&mut state, r#"{"id":2,"method":"RegisterElementBuilder","params":{"name":"place"}}"#);

        let response = call(
            &mut state,
            r#"{"id":3,"method":"AddToStoreInQuadKey","params":{"stylesheet":"style.mapcss","data":"places.geojson","x":35205,"y":21489,"lod":16}}"#,
        );
        assert_eq!(response["result"]["stored"], 1);

        let response = call(&mut state, r#"{"id":4,"method":"HasData","params":{"x":35204,"y":21489,"lod":16}}"#);
        assert_eq!(response["result"]["hasData"], false);

        let response = call(
            &mut state,
            r#"{"id":5,"method":"LoadQuadKey","params":{"stylesheet":"style.mapcss","x":35205,"y":21489,"lod":16}}"#,
        );
        let elements = response["result"]["elements"].as_array().unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0]["id"], 4);
        assert_eq!(elements[0]["tags"]["name"], "Berlin");

        let response = call(
            &mut state,
            r#"{"id":6,"method":"LoadQuadKeys","params":{"stylesheet":"style.mapcss","lod":16,"minX":35204,"maxX":35205,"minY":21489,"maxY":21489}}"#,
        );
        assert_eq!(response["result"]["tiles"].as_array().unwrap().len(), 2);

        assert_eq!(call(&mut state, r#"{"id":7,"method":"Cleanup"}"#)["result"]["status"], "ok");
        assert!(!state.is_configured());
    }
}
