//! Provides a tiny HTTP front-end which exposes a single group to end users.
//!
//! In contrast to the peer protocol, which is only used between the nodes of a cluster, this is
//! meant to be called by clients or for debugging purposes:
//! * **GET /api?key=Tom** returns the value of the given key (or **500** with the error message)
//! * **GET /api/stats** returns the cache statistics of the group as plain text
//!
//! All other paths are answered with **404**.
//!
//! # Example
//! ```no_run
//! # use std::sync::Arc;
//! # use zcache::builder::Builder;
//! # use zcache::group::LoaderFn;
//! # use zcache::registry::GroupRegistry;
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let platform = Builder::new().enable_all().build().await;
//! let group = platform.require::<GroupRegistry>().new_group(
//!     "scores",
//!     2 << 10,
//!     Arc::new(LoaderFn::new(|key: &str| Ok(key.as_bytes().to_vec()))),
//! );
//!
//! // Serves the group until the platform is terminated...
//! zcache::api::serve(platform, group, "0.0.0.0:9999").await
//! # }
//! ```
use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use hyper::header::HeaderValue;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, StatusCode};

use crate::fmt::format_size;
use crate::group::Group;
use crate::platform::Platform;
use crate::pool::text_response;
use crate::server::{await_termination, bind};

/// Answers a request of the front-end for the given group.
pub async fn handle(group: &Group, req: Request<Body>) -> Response<Body> {
    let path = req.uri().path().to_owned();
    let query = req.uri().query().unwrap_or("").to_owned();

    match path.as_str() {
        "/api" => {
            let key = match query_parameter(&query, "key") {
                Some(key) => key,
                None => {
                    return text_response(StatusCode::BAD_REQUEST, "missing parameter: key")
                }
            };

            match group.get(&key).await {
                Ok(value) => {
                    let mut response = Response::new(Body::from(value.byte_slice()));
                    let _ = response.headers_mut().insert(
                        hyper::header::CONTENT_TYPE,
                        HeaderValue::from_static("application/octet-stream"),
                    );
                    response
                }
                Err(error) => text_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
            }
        }
        "/api/stats" => text_response(StatusCode::OK, stats(group)),
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    }
}

/// Extracts and decodes the given parameter from a query string.
///
/// Returns **None** if the parameter is absent or if it isn't valid UTF-8 once decoded.
fn query_parameter(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| {
            urlencoding::decode(&value.replace('+', " "))
                .ok()
                .map(|value| value.into_owned())
        })
}

fn stats(group: &Group) -> String {
    let stats = group.stats();
    let limit = if stats.max_memory == 0 {
        "unbounded".to_owned()
    } else {
        format_size(stats.max_memory)
    };

    format!(
        "Group:       {}\n\
         Entries:     {}\n\
         Memory:      {} / {} ({:.1} %)\n\
         Reads:       {}\n\
         Hits:        {}\n\
         Hit rate:    {:.1} %\n\
         Writes:      {}\n\
         Evictions:   {}\n",
        group.name(),
        stats.entries,
        format_size(stats.allocated_memory),
        limit,
        stats.memory_utilization,
        stats.reads,
        stats.hits,
        stats.hit_rate,
        stats.writes,
        stats.evictions
    )
}

/// Serves the front-end for the given group on the given address until the platform is
/// terminated.
///
/// # Errors
/// Fails if the address cannot be bound or if the server fails.
pub async fn serve(platform: Arc<Platform>, group: Arc<Group>, address: &str) -> anyhow::Result<()> {
    let builder = bind(address).await?;
    let make_svc = make_service_fn(move |_conn| {
        let group = group.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let group = group.clone();
                async move { Ok::<_, Infallible>(handle(&group, req).await) }
            }))
        }
    });

    log::info!("API server is running at {}...", address);
    builder
        .serve(make_svc)
        .with_graceful_shutdown(await_termination(&platform))
        .await
        .context("The API server failed")?;
    log::info!("API server at {} has been stopped.", address);

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::api::{handle, query_parameter, serve};
    use crate::builder::Builder;
    use crate::group::{Group, LoaderFn};
    use crate::registry::GroupRegistry;
    use crate::testing::{http_get, test_async};
    use hyper::{Body, Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;

    fn scores() -> Group {
        Group::new(
            "scores",
            2 << 10,
            Arc::new(LoaderFn::new(|key: &str| match key {
                "Tom" => Ok(b"630".to_vec()),
                "Tom Smith" => Ok(b"42".to_vec()),
                _ => Err(anyhow::anyhow!("{} not exist", key)),
            })),
        )
    }

    async fn call(group: &Group, uri: &str) -> (StatusCode, String) {
        let response = handle(group, Request::get(uri).body(Body::empty()).unwrap()).await;
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();

        (status, String::from_utf8_lossy(&body).to_string())
    }

    #[test]
    fn query_parameters_are_decoded() {
        assert_eq!(
            query_parameter("key=Tom+Smith&x=1", "key"),
            Some("Tom Smith".to_owned())
        );
        assert_eq!(
            query_parameter("x=1&key=a%2Fb", "key"),
            Some("a/b".to_owned())
        );
        assert_eq!(query_parameter("x=1", "key"), None);
        assert_eq!(query_parameter("", "key"), None);
    }

    #[test]
    fn values_and_stats_are_reported() {
        test_async(async {
            let group = scores();

            assert_eq!(
                call(&group, "/api?key=Tom").await,
                (StatusCode::OK, "630".to_owned())
            );
            assert_eq!(
                call(&group, "/api?key=Tom+Smith").await,
                (StatusCode::OK, "42".to_owned())
            );
            assert_eq!(
                call(&group, "/api?key=Kate").await,
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Kate not exist".to_owned()
                )
            );
            assert_eq!(call(&group, "/api").await.0, StatusCode::BAD_REQUEST);
            assert_eq!(call(&group, "/index.html").await.0, StatusCode::NOT_FOUND);

            let (status, stats) = call(&group, "/api/stats").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(stats.contains("Group:       scores"), true);
            assert_eq!(stats.contains("Entries:     2"), true);
            assert_eq!(stats.contains("Memory:      17 bytes / 2.00 KiB (0.8 %)"), true);
        });
    }

    #[test]
    fn the_api_is_served_until_the_platform_terminates() {
        test_async(async {
            let platform = Builder::new().build().await;
            let group = platform.require::<GroupRegistry>().new_group(
                "scores",
                0,
                Arc::new(LoaderFn::new(|key: &str| Ok(key.as_bytes().to_vec()))),
            );

            let (tx, rx) = tokio::sync::oneshot::channel();
            let api_platform = platform.clone();
            crate::spawn!(async move {
                let result = serve(api_platform, group, "127.0.0.1:17831").await;
                let _ = tx.send(result.is_ok());
            });

            // Give the server a moment to bind its socket...
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(
                http_get("http://127.0.0.1:17831/api?key=Jack").await,
                (StatusCode::OK, "Jack".to_owned())
            );
            assert_eq!(
                http_get("http://127.0.0.1:17831/api/stats")
                    .await
                    .1
                    .contains("unbounded"),
                true
            );

            platform.terminate();
            assert_eq!(rx.await.unwrap(), true);
        });
    }
}
