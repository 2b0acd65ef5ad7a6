use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::{FileMetaError, FileMetaService, InodeId};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNameQuery {
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkQuery {
    pub old_file_name: String,
    pub new_file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct InodeQuery {
    pub inode: InodeId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
struct ApiError(FileMetaError);

impl warp::reject::Reject for ApiError {}

fn reject(err: FileMetaError) -> Rejection {
    warp::reject::custom(ApiError(err))
}

fn with_service(
    service: Arc<FileMetaService>,
) -> impl Filter<Extract = (Arc<FileMetaService>,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

/// `/api/files/*` routes, with rejection handling and request logging.
pub fn file_meta_routes(
    service: Arc<FileMetaService>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let files = warp::path("api").and(warp::path("files"));

    let create = files
        .and(warp::path("create"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::query::<FileNameQuery>())
        .and(with_service(service.clone()))
        .and_then(handle_create);

    let link = files
        .and(warp::path("link"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::query::<LinkQuery>())
        .and(with_service(service.clone()))
        .and_then(handle_link);

    let delete = files
        .and(warp::path("delete"))
        .and(warp::path::end())
        .and(warp::delete())
        .and(warp::query::<FileNameQuery>())
        .and(with_service(service.clone()))
        .and_then(handle_delete);

    let stat = files
        .and(warp::path("stat"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<FileNameQuery>())
        .and(with_service(service.clone()))
        .and_then(handle_stat);

    let by_inode = files
        .and(warp::path("inode"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<InodeQuery>())
        .and(with_service(service))
        .and_then(handle_find_by_inode);

    create
        .or(link)
        .or(delete)
        .or(stat)
        .or(by_inode)
        .recover(handle_rejection)
        .with(warp::log("file_meta::api"))
}

async fn handle_create(
    query: FileNameQuery,
    service: Arc<FileMetaService>,
) -> Result<impl Reply, Rejection> {
    let record = service.create_file(&query.file_name).await.map_err(reject)?;
    Ok(warp::reply::with_status(
        warp::reply::json(&record),
        StatusCode::CREATED,
    ))
}

async fn handle_link(
    query: LinkQuery,
    service: Arc<FileMetaService>,
) -> Result<impl Reply, Rejection> {
    let record = service
        .link_file(&query.old_file_name, &query.new_file_name)
        .await
        .map_err(reject)?;
    Ok(warp::reply::with_status(
        warp::reply::json(&record),
        StatusCode::CREATED,
    ))
}

async fn handle_delete(
    query: FileNameQuery,
    service: Arc<FileMetaService>,
) -> Result<impl Reply, Rejection> {
    service.delete_file(&query.file_name).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_stat(
    query: FileNameQuery,
    service: Arc<FileMetaService>,
) -> Result<impl Reply, Rejection> {
    let record = service.stat_file(&query.file_name).await.map_err(reject)?;
    Ok(warp::reply::json(&record))
}

async fn handle_find_by_inode(
    query: InodeQuery,
    service: Arc<FileMetaService>,
) -> Result<impl Reply, Rejection> {
    let record = service.find_by_inode(query.inode).await.map_err(reject)?;
    Ok(warp::reply::json(&record))
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, kind, message) = if let Some(ApiError(e)) = err.find::<ApiError>() {
        (e.http_status(), e.kind(), e.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found", "no such route".to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, "invalid_param", e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "method not allowed".to_string(),
        )
    } else {
        log::warn!("unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            format!("unhandled rejection: {:?}", err),
        )
    };

    let body = ErrorBody {
        error: kind.to_string(),
        message,
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileMetaDB, FileMetadataRecord};
    use tempfile::{tempdir, TempDir};

    fn create_test_service() -> (Arc<FileMetaService>, TempDir) {
        let tmp_dir = tempdir().unwrap();
        let db = FileMetaDB::new(tmp_dir.path().join("api.db")).unwrap();
        (Arc::new(FileMetaService::new(Arc::new(db))), tmp_dir)
    }

    fn decode_record(body: &[u8]) -> FileMetadataRecord {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_create_returns_201() {
        let (svc, _tmp) = create_test_service();
        let api = file_meta_routes(svc);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/files/create?fileName=x")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let record = decode_record(resp.body());
        assert_eq!(record.file_name, "x");
        assert_eq!(record.link_count, 1);
        assert!(record.id.is_some());
    }

    #[tokio::test]
    async fn test_link_and_stat() {
        let (svc, _tmp) = create_test_service();
        let api = file_meta_routes(svc);

        let created = warp::test::request()
            .method("POST")
            .path("/api/files/create?fileName=x")
            .reply(&api)
            .await;
        let x = decode_record(created.body());

        let resp = warp::test::request()
            .method("POST")
            .path("/api/files/link?oldFileName=x&newFileName=y")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let y = decode_record(resp.body());
        assert_eq!(y.file_name, "y");
        assert_eq!(y.inode, x.inode);
        assert_eq!(y.link_count, 2);

        let resp = warp::test::request()
            .method("GET")
            .path("/api/files/stat?fileName=x")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(decode_record(resp.body()).link_count, 2);

        let resp = warp::test::request()
            .method("GET")
            .path(&format!("/api/files/inode?inode={}", x.inode))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(decode_record(resp.body()).file_name, "x");
    }

    #[tokio::test]
    async fn test_link_missing_source_is_404() {
        let (svc, _tmp) = create_test_service();
        let api = file_meta_routes(svc);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/files/link?oldFileName=nope&newFileName=y")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: ErrorBody = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body.error, "not_found");

        let resp = warp::test::request()
            .method("GET")
            .path("/api/files/stat?fileName=y")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_returns_204_then_404() {
        let (svc, _tmp) = create_test_service();
        let api = file_meta_routes(svc);

        warp::test::request()
            .method("POST")
            .path("/api/files/create?fileName=x")
            .reply(&api)
            .await;

        let resp = warp::test::request()
            .method("DELETE")
            .path("/api/files/delete?fileName=x")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(resp.body().is_empty());

        let resp = warp::test::request()
            .method("DELETE")
            .path("/api/files/delete?fileName=x")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let (svc, _tmp) = create_test_service();
        let api = file_meta_routes(svc);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/files/create")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/files/create?fileName=")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body.error, "invalid_param");

        let resp = warp::test::request()
            .method("GET")
            .path("/api/files/unknown")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_names_are_opaque_strings() {
        let (svc, _tmp) = create_test_service();
        let api = file_meta_routes(svc);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/files/create?fileName=a%2Fb")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(decode_record(resp.body()).file_name, "a/b");

        let resp = warp::test::request()
            .method("DELETE")
            .path("/api/files/delete?fileName=%20")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = warp::test::request()
            .method("DELETE")
            .path("/api/files/delete?fileName=a%2Fb")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
