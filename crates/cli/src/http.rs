use axum::{
    body::Body,
    extract::State,
    http::{
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE},
        Response as HttpResponse, StatusCode,
    },
    response::{
        sse::{Event, KeepAlive, Sse},
        Response,
    },
    routing::get,
    Router,
};
use std::convert::Infallible;
use story_indexer::{index_json_bytes, StoryIndexGenerator};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};

pub const GENERATION_HEADER: &str = "x-index-generation";

pub fn router(generator: StoryIndexGenerator) -> Router {
    Router::new()
        .route("/index.json", get(index_json))
        .route("/index-stats.json", get(index_stats))
        .route("/index-events", get(index_events))
        .with_state(generator)
}

pub async fn serve_http(generator: StoryIndexGenerator, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    println!("Serving story index on http://{bind}/index.json");
    axum::serve(listener, router(generator)).await?;
    Ok(())
}

async fn index_json(State(generator): State<StoryIndexGenerator>) -> Result<Response, StatusCode> {
    let snapshot = match generator.get_index().await {
        Ok(snapshot) => snapshot,
        Err(err) => return error_response(&err.to_string()),
    };
    let bytes = match index_json_bytes(&snapshot.index) {
        Ok(bytes) => bytes,
        Err(err) => return error_response(&err.to_string()),
    };
    json_response(bytes, snapshot.generation)
}

async fn index_stats(State(generator): State<StoryIndexGenerator>) -> Result<Response, StatusCode> {
    let snapshot = match generator.get_index().await {
        Ok(snapshot) => snapshot,
        Err(err) => return error_response(&err.to_string()),
    };
    let bytes =
        serde_json::to_vec(&snapshot.summary).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    json_response(bytes, snapshot.generation)
}

/// One `invalidate` event per debounced notification; clients re-fetch
/// `/index.json` themselves.
async fn index_events(
    State(generator): State<StoryIndexGenerator>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(generator.subscribe()).filter_map(|message| {
        let invalidated = message.ok()?;
        Event::default()
            .event("invalidate")
            .json_data(&invalidated)
            .ok()
            .map(Ok)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn json_response(bytes: Vec<u8>, generation: u64) -> Result<Response, StatusCode> {
    HttpResponse::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(GENERATION_HEADER, generation.to_string())
        .body(Body::from(bytes))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

fn error_response(message: &str) -> Result<Response, StatusCode> {
    log::error!("Story index unavailable: {message}");
    HttpResponse::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Body::from(message.to_string()))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
