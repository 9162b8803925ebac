//! 离线队列与重试集成测试

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storefront_core::api::{HttpRequest, HttpTransport, STALE_AFTER};
use storefront_core::{
    with_retry, ApiClient, ApiError, ApiResponse, Method, NotificationManager, RequestConfig,
    StaticPlatform, TracingRenderer,
};
use tokio::time::sleep;

/// 可模拟断网的 transport，记录所有请求的 URL
#[derive(Default)]
struct FlakyNetwork {
    down: AtomicBool,
    urls: Mutex<Vec<String>>,
}

impl FlakyNetwork {
    fn hits(&self, url: &str) -> usize {
        self.urls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl HttpTransport for FlakyNetwork {
    async fn send(&self, request: HttpRequest) -> Result<ApiResponse, ApiError> {
        self.urls.lock().unwrap().push(request.url.clone());
        if self.down.load(Ordering::SeqCst) {
            return Err(ApiError::Network("offline".to_string()));
        }
        Ok(ApiResponse::json(
            201,
            serde_json::json!({"method": request.method.as_str(), "body": request.body}),
        ))
    }
}

fn offline_client() -> (ApiClient, Arc<FlakyNetwork>) {
    let network = Arc::new(FlakyNetwork::default());
    network.down.store(true, Ordering::SeqCst);
    let client = ApiClient::builder("https://shop.example.com/api")
        .transport(network.clone())
        .platform(Arc::new(StaticPlatform::new(false)))
        .notifier(NotificationManager::new(Arc::new(TracingRenderer)))
        .build()
        .unwrap();
    (client, network)
}

#[tokio::test(start_paused = true)]
async fn test_offline_add_to_cart_replays_on_reconnect() {
    // Given: 离线状态
    let (client, network) = offline_client();
    let url = "https://shop.example.com/api/cart/items";

    // When: 加入购物车
    let pending = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .request(
                    "/cart/items",
                    RequestConfig::new(Method::Post).with_body(serde_json::json!({"sku": "TEE-01", "qty": 1})),
                )
                .await
        })
    };

    // Then: 请求挂起
    sleep(Duration::from_secs(30)).await;
    assert!(!pending.is_finished());
    assert_eq!(client.pending_requests(), 1);
    assert_eq!(network.hits(url), 1);

    // When: 恢复在线
    network.down.store(false, Ordering::SeqCst);
    let report = client.set_connectivity(true).expect("drain started").await.unwrap();

    // Then: 恰好重放一次，原 future 拿到重放结果
    assert_eq!(report.replayed, 1);
    assert_eq!(network.hits(url), 2);
    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.status, 201);
    let body: serde_json::Value = response.decode().unwrap();
    assert_eq!(body["body"]["sku"], "TEE-01");
}

#[tokio::test(start_paused = true)]
async fn test_mixed_stale_and_fresh_entries() {
    let (client, network) = offline_client();

    let old = {
        let client = client.clone();
        tokio::spawn(async move { client.get("/wishlist").await })
    };
    sleep(STALE_AFTER - Duration::from_secs(10)).await;
    let fresh = {
        let client = client.clone();
        tokio::spawn(async move { client.get("/cart").await })
    };
    sleep(Duration::from_secs(20)).await;
    assert_eq!(client.pending_requests(), 2);

    network.down.store(false, Ordering::SeqCst);
    let report = client.set_connectivity(true).unwrap().await.unwrap();
    assert_eq!(report.stale, 1);
    assert_eq!(report.replayed, 1);

    assert!(matches!(old.await.unwrap(), Err(ApiError::Stale { .. })));
    assert!(fresh.await.unwrap().is_ok());
    assert_eq!(network.hits("https://shop.example.com/api/wishlist"), 1);
    assert_eq!(network.hits("https://shop.example.com/api/cart"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_with_retry_around_client_calls() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();

    let result: Result<&str, ApiError> = with_retry(
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ApiError::Status {
                        status: 503,
                        body: "unavailable".to_string(),
                    })
                } else {
                    Ok("ok")
                }
            }
        },
        5,
        Duration::from_millis(200),
    )
    .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let result: Result<(), ApiError> = with_retry(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ApiError::Status {
                    status: 404,
                    body: "not found".to_string(),
                })
            }
        },
        5,
        Duration::from_millis(200),
    )
    .await;
    assert!(result.unwrap_err().is_client_error());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
