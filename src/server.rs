//! HTTP status API for the view layer.
//!
//! A view polls these endpoints to render the current line; the only write
//! is the line-wide run state.
//!
//! - `GET  /api/plus`          every tracked PLU
//! - `GET  /api/plus/{id}`     one PLU
//! - `GET  /api/topology`      id -> inputs/outputs
//! - `GET  /api/roles`         role catalog
//! - `POST /api/line`          `{"state": "start" | "pause" | "restart" | "stop"}`

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::context::ControlCenter;
use crate::network::LineState;

#[derive(Debug, Serialize, Deserialize)]
struct LineRequest {
    state: LineState,
}

#[derive(Debug, Serialize, Deserialize)]
struct LineResponse {
    state: LineState,
    targets: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

fn with_center(
    center: Arc<ControlCenter>,
) -> impl Filter<Extract = (Arc<ControlCenter>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&center))
}

pub fn routes(
    center: Arc<ControlCenter>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let api = warp::path("api");

    let list_plus = api
        .and(warp::path("plus"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_center(Arc::clone(&center)))
        .and_then(handle_list_plus);

    let get_plu = api
        .and(warp::path("plus"))
        .and(warp::path::param::<u32>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_center(Arc::clone(&center)))
        .and_then(handle_get_plu);

    let topology = api
        .and(warp::path("topology"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_center(Arc::clone(&center)))
        .and_then(handle_topology);

    let roles = api
        .and(warp::path("roles"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_center(Arc::clone(&center)))
        .and_then(handle_roles);

    let line = api
        .and(warp::path("line"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_center(center))
        .and_then(handle_set_line);

    list_plus.or(get_plu).or(topology).or(roles).or(line)
}

async fn handle_list_plus(center: Arc<ControlCenter>) -> Result<impl Reply, Rejection> {
    let devices = center.registry().devices().await;
    Ok(warp::reply::json(&devices))
}

async fn handle_get_plu(id: u32, center: Arc<ControlCenter>) -> Result<Box<dyn Reply>, Rejection> {
    match center.registry().get(id).await {
        Some(device) => Ok(Box::new(warp::reply::json(&device))),
        None => Ok(Box::new(warp::reply::with_status(
            warp::reply::json(&ErrorResponse { error: format!("Unknown device: {}", id) }),
            StatusCode::NOT_FOUND,
        ))),
    }
}

async fn handle_topology(center: Arc<ControlCenter>) -> Result<impl Reply, Rejection> {
    let topology = center.registry().topology().await;
    Ok(warp::reply::json(&topology))
}

async fn handle_roles(center: Arc<ControlCenter>) -> Result<impl Reply, Rejection> {
    let roles = center.roles().read().await;
    Ok(warp::reply::json(&roles.entries()))
}

async fn handle_set_line(
    request: LineRequest,
    center: Arc<ControlCenter>,
) -> Result<impl Reply, Rejection> {
    let targets = center.registry().len().await;
    // Delivery continues in the background.
    drop(center.set_line_state(request.state).await);
    Ok(warp::reply::with_status(
        warp::reply::json(&LineResponse { state: request.state, targets }),
        StatusCode::ACCEPTED,
    ))
}

/// Serve the API on `addr` until `shutdown` resolves.
pub fn serve(
    center: Arc<ControlCenter>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), warp::Error> {
    let (bound, server) =
        warp::serve(routes(center)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    log::info!("Status API listening on http://{}", bound);
    Ok((bound, server))
}

/// Bind the API, then start discovery. If the bind fails nothing is started.
pub async fn launch(
    center: Arc<ControlCenter>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), warp::Error> {
    let (bound, server) = serve(Arc::clone(&center), addr, shutdown)?;
    center.start().await;
    Ok((bound, server))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;
    use crate::network::{LivenessProbe, ProbeOutcome, UnreachableReason};
    use crate::registry::{Observation, PollSnapshot};
    use crate::roles::RoleCatalog;
    use crate::topology::Position;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct Offline;

    #[async_trait]
    impl LivenessProbe for Offline {
        async fn probe(&self, _address: &str) -> ProbeOutcome {
            ProbeOutcome::Unreachable(UnreachableReason::Connection)
        }
    }

    async fn make_center() -> Arc<ControlCenter> {
        let mut catalog = RoleCatalog::new(PathBuf::from("unused-roles.db"));
        catalog.add("Cutter").unwrap();
        let center = ControlCenter::with_probe(
            ControlConfig::default(),
            catalog,
            Vec::new(),
            Arc::new(Offline),
        )
        .unwrap();

        center
            .registry()
            .reconcile(PollSnapshot::new(vec![
                Observation::new(1, "127.0.0.1:9", Some(1), 80),
                Observation::new(2, "127.0.0.1:9", None, 20),
            ]))
            .await;
        center
            .registry()
            .update_status(1, None, Some(Position::new(0.0, 0.0)))
            .await
            .unwrap();
        center
            .registry()
            .update_status(2, None, Some(Position::new(10.0, 0.0)))
            .await
            .unwrap();
        Arc::new(center)
    }

    struct AlwaysOne;

    #[async_trait]
    impl LivenessProbe for AlwaysOne {
        async fn probe(&self, _address: &str) -> ProbeOutcome {
            ProbeOutcome::Reachable(crate::network::StatusReport {
                id: 1,
                role: 1,
                battery_level: 60,
            })
        }
    }

    fn polling_center() -> Arc<ControlCenter> {
        let config = ControlConfig { delay_secs: 1, ..ControlConfig::default() };
        let center = ControlCenter::with_probe(
            config,
            RoleCatalog::new(PathBuf::from("unused-roles.db")),
            vec!["10.9.9.1".into()],
            Arc::new(AlwaysOne),
        )
        .unwrap();
        Arc::new(center)
    }

    #[tokio::test]
    async fn test_launch_does_not_poll_when_bind_fails() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let center = polling_center();

        let result = launch(
            Arc::clone(&center),
            taken.local_addr().unwrap(),
            std::future::pending(),
        )
        .await;
        assert!(result.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(center.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_launch_serves_and_polls() {
        let center = polling_center();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let (bound, server) = launch(Arc::clone(&center), ([127, 0, 0, 1], 0).into(), async {
            let _ = rx.await;
        })
        .await
        .unwrap();
        let server = tokio::spawn(server);
        assert_ne!(bound.port(), 0);

        for _ in 0..100 {
            if center.registry().get(1).await.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(center.registry().get(1).await.is_some());

        let _ = tx.send(());
        server.await.unwrap();
        center.shutdown().await;
    }

    #[tokio::test]
    async fn test_list_plus() {
        let api = routes(make_center().await);
        let res = warp::test::request().method("GET").path("/api/plus").reply(&api).await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["id"], 1);
        assert_eq!(body[0]["role_id"], 1);
        assert_eq!(body[1]["battery_level"], 20);
    }

    #[tokio::test]
    async fn test_get_plu() {
        let api = routes(make_center().await);

        let res = warp::test::request().method("GET").path("/api/plus/2").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["connections"]["inputs"], serde_json::json!([1]));

        let res = warp::test::request().method("GET").path("/api/plus/9").reply(&api).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_topology_and_roles() {
        let api = routes(make_center().await);

        let res = warp::test::request().method("GET").path("/api/topology").reply(&api).await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["1"]["outputs"], serde_json::json!([2]));

        let res = warp::test::request().method("GET").path("/api/roles").reply(&api).await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, serde_json::json!([{"id": 1, "name": "Cutter"}]));
    }

    #[tokio::test]
    async fn test_set_line_state() {
        let api = routes(make_center().await);

        let res = warp::test::request()
            .method("POST")
            .path("/api/line")
            .json(&serde_json::json!({"state": "pause"}))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, serde_json::json!({"state": "pause", "targets": 2}));

        let res = warp::test::request()
            .method("POST")
            .path("/api/line")
            .json(&serde_json::json!({"state": "explode"}))
            .reply(&api)
            .await;
        assert!(res.status().is_client_error());
    }
}
