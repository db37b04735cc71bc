use std::collections::HashMap;
use std::path::Path as FsPath;

use axum::{
    body::{Body, Bytes},
    extract::{multipart::MultipartRejection, rejection::JsonRejection, Multipart, Path, State},
    http::header,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::audio::AudioInfo;
use crate::service::{ProcessedSample, SpeechOptions};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub text: String,
    pub language: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct SpeechResponse {
    pub success: bool,
    pub audio_path: String,
    pub audio_info: AudioInfo,
    pub text: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_file: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SamplesResponse {
    pub success: bool,
    pub processed_samples: Vec<ProcessedSample>,
    pub count: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "device": state.service.device(),
        "models_loaded": state.service.models(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn models(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "models": state.service.models(),
        "device": state.service.device(),
    }))
}

pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<SpeechResponse>, ApiError> {
    let Json(req) = payload
        .map_err(|e| ApiError::with_status(e.status(), format!("Invalid JSON body: {e}")))?;
    if req.text.trim().is_empty() {
        return Err(ApiError::bad_request("Text is required"));
    }
    let language = req.language.as_deref().unwrap_or("en").to_lowercase();
    log::info!(
        "POST /generate: {} chars, language '{language}'",
        req.text.chars().count()
    );

    let options = SpeechOptions {
        voice: req.voice,
        speed: req.speed,
    };
    let service = state.service.clone();
    let (text, lang) = (req.text.clone(), language.clone());
    let (path, audio_info) = blocking(move || {
        let path = service.generate_speech_with(&text, &lang, &options, None, None)?;
        let info = service.audio_info(&path);
        Ok((path, info))
    })
    .await?;

    Ok(Json(SpeechResponse {
        success: true,
        audio_path: path.to_string_lossy().into_owned(),
        audio_info,
        text: req.text,
        language,
        speaker_file: None,
    }))
}

pub async fn clone_voice(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SpeechResponse>, ApiError> {
    let mut form = Form::read(multipart, &["speaker_audio"]).await?;

    let text = form.text("text").unwrap_or_default().to_string();
    let language = form.text("language").unwrap_or("en").to_lowercase();
    if text.trim().is_empty() {
        return Err(ApiError::bad_request("Text is required"));
    }
    let speaker = form
        .take_files("speaker_audio")
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::bad_request("Speaker audio file is required"))?;
    if speaker.filename.is_empty() {
        return Err(ApiError::bad_request("No file selected"));
    }
    log::info!(
        "POST /clone: {} chars, language '{language}', reference '{}' ({} bytes)",
        text.chars().count(),
        speaker.filename,
        speaker.bytes.len()
    );

    let service = state.service.clone();
    let speaker_file = speaker.filename.clone();
    let (t, lang) = (text.clone(), language.clone());
    let (path, audio_info) = blocking(move || {
        // The upload is removed when `reference` drops, whatever the outcome.
        let reference = service.store_speaker(&speaker.filename, &speaker.bytes)?;
        let path = service.clone_voice(&t, reference.path(), &lang, None)?;
        let info = service.audio_info(&path);
        Ok((path, info))
    })
    .await?;

    Ok(Json(SpeechResponse {
        success: true,
        audio_path: path.to_string_lossy().into_owned(),
        audio_info,
        text,
        language,
        speaker_file: Some(speaker_file),
    }))
}

pub async fn audio(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let path = state
        .service
        .resolve_output(&filename)
        .ok_or_else(|| ApiError::not_found("Audio file not found").bare())?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::internal(e.to_string()).bare())?;
    log::debug!("GET /audio/{filename}: {} bytes", bytes.len());

    Response::builder()
        .header(header::CONTENT_TYPE, "audio/wav")
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{filename}\""),
        )
        .body(Body::from(bytes))
        .map_err(|e| ApiError::internal(e.to_string()).bare())
}

pub async fn process_samples(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SamplesResponse>, ApiError> {
    let mut form = Form::read(multipart, &["samples"]).await?;

    let samples = form.take_files("samples");
    if samples.is_empty() {
        return Err(ApiError::bad_request("No samples provided"));
    }
    let transcripts = form.texts("transcripts").to_vec();
    if samples.len() != transcripts.len() {
        return Err(ApiError::bad_request(
            "Number of files and transcripts must match",
        ));
    }
    if samples.len() > state.max_samples {
        return Err(ApiError::bad_request(format!(
            "Too many samples: at most {} per request",
            state.max_samples
        )));
    }
    log::info!("POST /process_samples: {} samples", samples.len());

    let service = state.service.clone();
    let processed_samples: Vec<ProcessedSample> = blocking(move || {
        samples
            .into_iter()
            .zip(transcripts)
            .filter(|(upload, _)| !upload.filename.is_empty())
            .map(|(upload, transcript)| {
                service.process_sample(&upload.filename, &transcript, &upload.bytes)
            })
            .collect()
    })
    .await?;

    Ok(Json(SamplesResponse {
        success: true,
        count: processed_samples.len(),
        processed_samples,
    }))
}

/// Run service work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::internal(format!("Worker task failed: {e}")))?
        .map_err(ApiError::from)
}

struct Upload {
    filename: String,
    bytes: Bytes,
}

/// A fully read multipart form.
#[derive(Default)]
struct Form {
    fields: HashMap<String, Vec<String>>,
    files: HashMap<String, Vec<Upload>>,
}

impl Form {
    /// Read every part; parts named in `file_fields` are kept as uploads.
    async fn read(
        multipart: Result<Multipart, MultipartRejection>,
        file_fields: &[&str],
    ) -> Result<Self, ApiError> {
        let mut multipart = multipart.map_err(|e| {
            ApiError::with_status(e.status(), format!("Invalid multipart payload: {e}"))
        })?;
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| {
                ApiError::with_status(e.status(), format!("Failed reading multipart field: {e}"))
            })?
        {
            let name = field.name().unwrap_or_default().to_string();
            if file_fields.contains(&name.as_str()) {
                let filename = field
                    .file_name()
                    .and_then(crate::service::files::upload_name)
                    .unwrap_or_default()
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::with_status(
                        e.status(),
                        format!("Failed reading multipart '{name}' field: {e}"),
                    )
                })?;
                form.files
                    .entry(name)
                    .or_default()
                    .push(Upload { filename, bytes });
            } else {
                let value = field.text().await.map_err(|e| {
                    ApiError::with_status(
                        e.status(),
                        format!("Failed reading multipart '{name}' field: {e}"),
                    )
                })?;
                form.fields.entry(name).or_default().push(value);
            }
        }
        Ok(form)
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name)?.first().map(String::as_str)
    }

    fn texts(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    fn take_files(&mut self, name: &str) -> Vec<Upload> {
        self.files.remove(name).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::super::create_router;
    use super::*;
    use crate::audio::{self, tests::sine};
    use crate::service::tests::service_in;
    use axum::{
        body::to_bytes,
        http::{Request, StatusCode},
        Router,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "locus-test-boundary";

    fn app(dir: &FsPath, cloning: bool) -> Router {
        create_router(AppState {
            service: Arc::new(service_in(dir, cloning)),
            max_samples: 2,
            max_upload_bytes: 4 * 1024 * 1024,
        })
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    struct Part {
        name: &'static str,
        filename: Option<&'static str>,
        content: Vec<u8>,
    }

    fn field(name: &'static str, value: &str) -> Part {
        Part {
            name,
            filename: None,
            content: value.as_bytes().to_vec(),
        }
    }

    fn file(name: &'static str, filename: &'static str, content: &[u8]) -> Part {
        Part {
            name,
            filename: Some(filename),
            content: content.to_vec(),
        }
    }

    fn post_multipart(uri: &str, parts: &[Part]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            let name = part.name;
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            let disposition = match part.filename {
                Some(filename) => format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                     Content-Type: audio/wav\r\n\r\n"
                ),
                None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(&part.content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn wav_bytes(dir: &FsPath) -> Vec<u8> {
        let path = dir.join("reference-source.wav");
        audio::write_wav_pcm16(&path, &sine(180.0, 16_000, 1.0, 0.4), 16_000).unwrap();
        std::fs::read(path).unwrap()
    }

    fn leftover_speakers(dir: &FsPath) -> usize {
        std::fs::read_dir(dir.join("samples"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("speaker_"))
            .count()
    }

    #[tokio::test]
    async fn health_lists_models() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = send(app(dir.path(), true), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["device"], "cpu");
        assert_eq!(body["models_loaded"], json!(["multilingual", "en", "nl"]));
        assert!(body["version"].is_string());

        let (status, body) = send(app(dir.path(), true), get("/models")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["models"][0], "multilingual");
    }

    #[tokio::test]
    async fn generate_returns_path_and_info() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = send(
            app(dir.path(), false),
            post_json("/generate", json!({"text": "Hallo daar", "language": "NL"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["language"], "nl");
        assert_eq!(body["text"], "Hallo daar");
        assert_eq!(body["audio_info"]["sample_rate"], 24_000);
        assert_eq!(body["audio_info"]["channels"], 1);
        assert!(body.get("speaker_file").is_none());

        let path = body["audio_path"].as_str().unwrap();
        assert!(path.contains("tts_") && path.ends_with(".wav"));
        assert!(FsPath::new(path).exists());
    }

    #[tokio::test]
    async fn generate_rejects_blank_text() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = send(
            app(dir.path(), false),
            post_json("/generate", json!({"text": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"success": false, "error": "Text is required"}));

        let req = Request::post("/generate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(app(dir.path(), false), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn generated_audio_is_downloadable() {
        let dir = tempfile::tempdir().unwrap();
        let router = app(dir.path(), false);
        let (_, body) = send(
            router.clone(),
            post_json("/generate", json!({"text": "hello world"})),
        )
        .await;
        let path = body["audio_path"].as_str().unwrap();
        let name = FsPath::new(path).file_name().unwrap().to_str().unwrap();

        let res = router
            .clone()
            .oneshot(get(&format!("/audio/{name}")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "audio/wav");
        assert!(res.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("inline"));
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..4], b"RIFF");

        let (status, body) = send(router, get("/audio/missing.wav")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Audio file not found"}));
    }

    #[tokio::test]
    async fn clone_uses_reference_and_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let wav = wav_bytes(dir.path());
        let req = post_multipart(
            "/clone",
            &[
                field("text", "Bonjour tout le monde"),
                field("language", "FR"),
                file("speaker_audio", "ref.wav", &wav),
            ],
        );
        let (status, body) = send(app(dir.path(), true), req).await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["success"], true);
        assert_eq!(body["language"], "fr");
        assert_eq!(body["speaker_file"], "ref.wav");
        assert!(body["audio_path"].as_str().unwrap().contains("clone_"));
        assert_eq!(leftover_speakers(dir.path()), 0);
    }

    #[tokio::test]
    async fn clone_validates_form() {
        let dir = tempfile::tempdir().unwrap();
        let wav = wav_bytes(dir.path());

        let cases = vec![
            (vec![file("speaker_audio", "ref.wav", &wav)], "Text is required"),
            (
                vec![field("text", "hello")],
                "Speaker audio file is required",
            ),
            (
                vec![field("text", "hello"), file("speaker_audio", "", &wav)],
                "No file selected",
            ),
        ];
        for (parts, message) in cases {
            let (status, body) =
                send(app(dir.path(), true), post_multipart("/clone", &parts)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], message);
        }
    }

    #[tokio::test]
    async fn clone_without_cloning_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        let wav = wav_bytes(dir.path());
        let req = post_multipart(
            "/clone",
            &[field("text", "hello"), file("speaker_audio", "ref.wav", &wav)],
        );
        let (status, body) = send(app(dir.path(), false), req).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"success": false, "error": "Voice cloning model not loaded"})
        );
        assert_eq!(leftover_speakers(dir.path()), 0);
    }

    #[tokio::test]
    async fn process_samples_stores_each_sample() {
        let dir = tempfile::tempdir().unwrap();
        let wav = wav_bytes(dir.path());
        let req = post_multipart(
            "/process_samples",
            &[
                file("samples", "one.wav", &wav),
                field("transcripts", "first take"),
                file("samples", "", b""),
                field("transcripts", "skipped"),
            ],
        );
        let (status, body) = send(app(dir.path(), false), req).await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["count"], 1);
        let sample = &body["processed_samples"][0];
        assert_eq!(sample["filename"], "one.wav");
        assert_eq!(sample["transcript"], "first take");
        assert_eq!(sample["audio_info"]["sample_rate"], 16_000);
        assert_eq!(sample["id"].as_str().unwrap().len(), 8);
        assert!(FsPath::new(sample["path"].as_str().unwrap()).exists());
        assert!(sample["processed_path"].is_string());
    }

    #[tokio::test]
    async fn process_samples_validates_counts() {
        let dir = tempfile::tempdir().unwrap();
        let wav = wav_bytes(dir.path());

        let cases = vec![
            (vec![field("transcripts", "orphan")], "No samples provided"),
            (
                vec![
                    file("samples", "a.wav", &wav),
                    file("samples", "b.wav", &wav),
                    field("transcripts", "only one"),
                ],
                "Number of files and transcripts must match",
            ),
            (
                vec![
                    file("samples", "a.wav", &wav),
                    file("samples", "b.wav", &wav),
                    file("samples", "c.wav", &wav),
                    field("transcripts", "a"),
                    field("transcripts", "b"),
                    field("transcripts", "c"),
                ],
                "Too many samples: at most 2 per request",
            ),
        ];
        for (parts, message) in cases {
            let (status, body) = send(
                app(dir.path(), false),
                post_multipart("/process_samples", &parts),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], message);
        }
    }
}
