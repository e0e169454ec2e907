use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use serde_json::json;
use trip_imagery::{AppConfig, AssetPipeline, AssetRequest, AssetType, PipelineError};
use wiremock::matchers::{body_partial_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STABILITY_CORE: &str = "/v2beta/stable-image/generate/core";
const STORAGE_PUT: &str = r"^/storage/v1/object/TRIPS/.+$";

fn square_png(side: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(side, side, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

fn config(server: &MockServer, extra: &str) -> AppConfig {
    let uri = server.uri();
    AppConfig::from_toml_str(&format!(
        r#"
        [http]
        timeout_seconds = 10

        [stability]
        api_key = "sk-test"
        api_base = "{uri}"
        response = "raw"

        [storage]
        url = "{uri}"
        service_key = "service-key"

        {extra}
        "#
    ))
    .unwrap()
}

fn ramen_slider() -> AssetRequest {
    AssetRequest {
        trip_name: Some("Tokyo Food Week".to_string()),
        ..AssetRequest::slider("ramen bowl", "Shinjuku", "Tokyo", "Japan")
    }
}

async fn mount_storage(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path_regex(STORAGE_PUT))
        .and(header("x-upsert", "true"))
        .and(header("authorization", "Bearer service-key"))
        .and(header("apikey", "service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Key": "ok" })))
        .mount(server)
        .await;
}

async fn uploaded_objects(server: &MockServer) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.method.as_str() == "PUT")
        .collect()
}

#[tokio::test]
async fn slider_is_generated_cropped_encoded_and_uploaded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STABILITY_CORE))
        .and(header("accept", "image/*"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(square_png(1024), "image/png"))
        .expect(1)
        .mount(&server)
        .await;
    mount_storage(&server).await;

    let pipeline = AssetPipeline::new(&config(&server, "")).unwrap();
    let result = pipeline.deliver(ramen_slider()).await.unwrap();

    let public_base = format!("{}/storage/v1/object/public/TRIPS/", server.uri());
    assert!(result.url.starts_with(&public_base), "{}", result.url);
    assert_eq!(result.asset_type, AssetType::Slider);
    assert_eq!(result.usage, "slider");
    assert_eq!(result.city.as_deref(), Some("Tokyo"));
    assert_eq!(result.country.as_deref(), Some("Japan"));

    let uploads = uploaded_objects(&server).await;
    assert_eq!(uploads.len(), 1);
    let upload = &uploads[0];

    let key = upload
        .url
        .path()
        .strip_prefix("/storage/v1/object/TRIPS/")
        .unwrap();
    let (folder, filename) = key.rsplit_once('/').unwrap();
    assert!(folder.starts_with("tokyo-food-week-"), "{folder}");
    let timestamp = filename
        .strip_prefix("slider_")
        .and_then(|rest| rest.strip_suffix(".webp"))
        .unwrap();
    assert!(timestamp.parse::<i64>().is_ok(), "{filename}");
    assert!(result.url.ends_with(key));

    assert_eq!(
        upload.headers.get("content-type").unwrap().to_str().unwrap(),
        "image/webp"
    );
    assert_eq!(
        upload.headers.get("cache-control").unwrap().to_str().unwrap(),
        "public, max-age=31536000, immutable"
    );

    let stored = image::load_from_memory(&upload.body).unwrap();
    assert_eq!(stored.dimensions(), (800, 600));

    let generation = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|request| request.method.as_str() == "POST")
        .unwrap();
    let form = String::from_utf8_lossy(&generation.body);
    assert!(form.contains("name=\"style_preset\"\r\n\r\nphotographic\r\n"), "{form}");
    assert!(form.contains("name=\"aspect_ratio\"\r\n\r\n5:4\r\n"), "{form}");
}

#[tokio::test]
async fn every_shot_failing_surfaces_the_backend_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STABILITY_CORE))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = AssetPipeline::new(&config(&server, "")).unwrap();
    let request = AssetRequest {
        shots: Some(3),
        ..ramen_slider()
    };
    let err = pipeline.deliver(request).await.unwrap_err();

    assert!(err.to_string().contains("500"), "{err}");
    match err {
        PipelineError::Provider(provider) => assert_eq!(provider.status(), Some(500)),
        other => panic!("unexpected error: {other:?}"),
    }
}

fn openrouter_slider(server: &MockServer) -> AppConfig {
    let uri = server.uri();
    config(
        server,
        &format!(
            r#"
            [openrouter]
            api_key = "or-test"
            api_url = "{uri}/api/v1/chat/completions"

            [providers.slider]
            provider = "openrouter"
            "#
        ),
    )
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
}

#[tokio::test]
async fn last_shot_error_is_reported_when_all_fail() {
    let server = MockServer::start().await;
    for (seed, status, body) in [(41, 500, "shot zero"), (42, 502, "shot one"), (43, 503, "shot two")] {
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(body_partial_json(json!({ "seed": seed })))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let pipeline = AssetPipeline::new(&openrouter_slider(&server)).unwrap();
    let request = AssetRequest {
        shots: Some(3),
        seed: Some(41),
        ..ramen_slider()
    };
    let err = pipeline.deliver(request).await.unwrap_err();
    match err {
        PipelineError::Provider(provider) => {
            assert_eq!(provider.status(), Some(503));
            assert!(provider.to_string().contains("shot two"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(uploaded_objects(&server).await.is_empty());
}

#[tokio::test]
async fn remote_image_url_is_fetched_and_delivered() {
    let server = MockServer::start().await;
    let image_url = format!("{}/cdn/generated.png", server.uri());
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_reply(&format!("Rendered: {image_url} enjoy"))),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/generated.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(square_png(1024), "image/png"))
        .expect(1)
        .mount(&server)
        .await;
    mount_storage(&server).await;

    let pipeline = AssetPipeline::new(&openrouter_slider(&server)).unwrap();
    let result = pipeline.deliver(ramen_slider()).await.unwrap();
    assert!(result.url.ends_with(".webp"));

    let uploads = uploaded_objects(&server).await;
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].url.path().contains("/slider_"));
    let stored = image::load_from_memory(&uploads[0].body).unwrap();
    assert_eq!(stored.dimensions(), (800, 600));
}

#[tokio::test]
async fn missing_remote_image_fails_with_its_status() {
    let server = MockServer::start().await;
    let image_url = format!("{}/cdn/expired.png", server.uri());
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(&image_url)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/expired.png"))
        .respond_with(ResponseTemplate::new(404).set_body_string("object expired"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = AssetPipeline::new(&openrouter_slider(&server)).unwrap();
    let err = pipeline.deliver(ramen_slider()).await.unwrap_err();
    match err {
        PipelineError::Provider(provider) => {
            assert_eq!(provider.status(), Some(404));
            assert!(provider.to_string().contains("object expired"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn one_failed_shot_does_not_abort_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STABILITY_CORE))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(STABILITY_CORE))
        .respond_with(ResponseTemplate::new(200).set_body_raw(square_png(640), "image/png"))
        .mount(&server)
        .await;
    mount_storage(&server).await;

    let pipeline = AssetPipeline::new(&config(&server, "")).unwrap();
    let request = AssetRequest {
        shots: Some(2),
        trip_folder: Some("/trips/tokyo/".to_string()),
        ..ramen_slider()
    };
    let result = pipeline.deliver(request).await.unwrap();

    assert!(result.url.contains("/object/public/TRIPS/trips/tokyo/slider_"));
    assert_eq!(uploaded_objects(&server).await.len(), 1);
}

#[tokio::test]
async fn base64_json_envelope_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2beta/stable-image/generate/ultra"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "image": BASE64_STANDARD.encode(square_png(512)),
            "finish_reason": "SUCCESS",
            "seed": 7
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_storage(&server).await;

    let uri = server.uri();
    let config = AppConfig::from_toml_str(&format!(
        r#"
        [stability]
        api_key = "sk-test"
        api_base = "{uri}"
        response = "base64_json"

        [storage]
        url = "{uri}"
        service_key = "service-key"
        "#
    ))
    .unwrap();

    let pipeline = AssetPipeline::new(&config).unwrap();
    let result = pipeline
        .deliver(AssetRequest::hero("Lisbon", "Portugal"))
        .await
        .unwrap();
    assert!(result.url.ends_with(".jpg"));

    let uploads = uploaded_objects(&server).await;
    let stored = image::load_from_memory(&uploads[0].body).unwrap();
    assert_eq!(stored.dimensions(), (1920, 1080));
    assert!(uploads[0].body.len() <= 500 * 1024);
}

#[tokio::test]
async fn chat_completion_backend_returns_data_url() {
    let server = MockServer::start().await;
    let data_url = format!(
        "data:image/png;base64,{}",
        BASE64_STANDARD.encode(square_png(300))
    );
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("authorization", "Bearer or-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "",
                    "images": [{ "type": "image_url", "image_url": { "url": data_url } }]
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_storage(&server).await;

    let uri = server.uri();
    let extra = format!(
        r#"
        [openrouter]
        api_key = "or-test"
        api_url = "{uri}/api/v1/chat/completions"

        [providers.background]
        provider = "OpenRouter"
        "#
    );
    let pipeline = AssetPipeline::new(&config(&server, &extra)).unwrap();
    let request = AssetRequest {
        format: Some(trip_imagery::OutputFormat::Png),
        width: Some(640),
        height: Some(360),
        ..AssetRequest::background("street food crawl", "Bangkok", "Thailand")
    };
    let result = pipeline.deliver(request).await.unwrap();
    assert!(result.url.ends_with(".png"));

    let uploads = uploaded_objects(&server).await;
    assert_eq!(
        uploads[0].headers.get("content-type").unwrap().to_str().unwrap(),
        "image/png"
    );
    let stored = image::load_from_memory(&uploads[0].body).unwrap();
    assert_eq!(stored.dimensions(), (640, 360));
}

#[tokio::test]
async fn rejected_upload_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STABILITY_CORE))
        .respond_with(ResponseTemplate::new(200).set_body_raw(square_png(256), "image/png"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("new row violates row-level security"))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = AssetPipeline::new(&config(&server, "")).unwrap();
    let err = pipeline.deliver(ramen_slider()).await.unwrap_err();
    match err {
        PipelineError::Upload { status, body } => {
            assert_eq!(status, 403);
            assert!(body.contains("row-level security"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STABILITY_CORE))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(square_png(64), "image/png")
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut config = config(&server, "");
    config.http.timeout = std::time::Duration::from_secs(1);
    let pipeline = AssetPipeline::new(&config).unwrap();
    let err = pipeline.deliver(ramen_slider()).await.unwrap_err();
    assert!(err.to_string().contains("timed out"), "{err}");
}

#[tokio::test]
async fn invalid_request_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = AssetPipeline::new(&config(&server, "")).unwrap();
    let err = pipeline
        .deliver(AssetRequest::new(AssetType::Slider))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));
}

#[test]
fn missing_storage_fails_at_construction() {
    let config = AppConfig::from_toml_str(
        r#"
        [stability]
        api_key = "sk-test"
        "#,
    )
    .unwrap();
    assert!(matches!(
        AssetPipeline::new(&config),
        Err(PipelineError::MissingConfig(_))
    ));
}
