use bytes::Bytes;
use memo_storage::{ObjectStore, PutCondition, S3Backend, StorageError};
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::{ContainerAsync, GenericImage, ImageExt, runners::AsyncRunner};

const MINIO_IMAGE: &str = "minio/minio";
// Conditional PutObject needs a release from late 2024 or newer.
const MINIO_TAG: &str = "RELEASE.2025-04-22T22-12-26Z";

fn should_skip_s3_tests() -> bool {
    std::env::var("SKIP_S3_TESTS").is_ok()
}

struct MinioContext {
    _container: ContainerAsync<GenericImage>,
    endpoint: String,
    access_key: String,
    secret_key: String,
}

impl MinioContext {
    async fn new() -> Result<Self, String> {
        let access_key = "minio-access-key".to_string();
        let secret_key = "minio-secret-key".to_string();

        let container: ContainerAsync<GenericImage> = GenericImage::new(MINIO_IMAGE, MINIO_TAG)
            .with_exposed_port(9000.tcp())
            .with_wait_for(WaitFor::message_on_stdout("API:"))
            .with_env_var("MINIO_ROOT_USER", access_key.clone())
            .with_env_var("MINIO_ROOT_PASSWORD", secret_key.clone())
            .with_cmd(vec!["server", "/data"])
            .start()
            .await
            .map_err(|e| format!("failed to start MinIO container: {e}"))?;

        let host = container
            .get_host()
            .await
            .map_err(|e| format!("failed to get host: {e}"))?;
        let port = container
            .get_host_port_ipv4(9000.tcp())
            .await
            .map_err(|e| format!("failed to get port: {e}"))?;

        Ok(Self {
            _container: container,
            endpoint: format!("http://{host}:{port}"),
            access_key,
            secret_key,
        })
    }
}

struct S3TestHarness {
    _context: MinioContext,
    backend: S3Backend,
}

impl S3TestHarness {
    async fn new(prefix: Option<String>) -> Result<Self, String> {
        let context = MinioContext::new().await?;
        let bucket = "memo-test";

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new("us-east-1"))
            .load()
            .await;
        let config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                context.access_key.clone(),
                context.secret_key.clone(),
                None,
                None,
                "test",
            ))
            .endpoint_url(context.endpoint.clone())
            .force_path_style(true)
            .build();
        aws_sdk_s3::Client::from_conf(config)
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| format!("failed to create bucket: {e}"))?;

        let backend = S3Backend::new(
            bucket,
            Some(context.endpoint.clone()),
            Some("us-east-1".to_string()),
            prefix,
            Some(context.access_key.clone()),
            Some(context.secret_key.clone()),
            true,
        )
        .await
        .map_err(|e| format!("failed to create S3 backend: {e}"))?;

        Ok(Self {
            _context: context,
            backend,
        })
    }
}

#[tokio::test]
async fn test_s3_conditional_writes() {
    if should_skip_s3_tests() {
        return;
    }

    let harness = match S3TestHarness::new(Some("prefix".to_string())).await {
        Ok(harness) => harness,
        Err(err) => {
            eprintln!("Skipping S3 test: {err}");
            return;
        }
    };
    let backend = &harness.backend;

    let v1 = backend
        .put_conditional("md/k", Bytes::from_static(b"one"), &PutCondition::IfNoneMatch)
        .await
        .unwrap();
    assert!(matches!(
        backend
            .put_conditional("md/k", Bytes::from_static(b"dup"), &PutCondition::IfNoneMatch)
            .await,
        Err(StorageError::PreconditionFailed(_))
    ));

    let read = backend.get("md/k").await.unwrap();
    assert_eq!(read.etag, v1);

    let v2 = backend
        .put_conditional(
            "md/k",
            Bytes::from_static(b"two"),
            &PutCondition::IfMatch(v1.clone()),
        )
        .await
        .unwrap();
    assert_ne!(v1, v2);
    assert!(matches!(
        backend
            .put_conditional("md/k", Bytes::from_static(b"three"), &PutCondition::IfMatch(v1))
            .await,
        Err(StorageError::PreconditionFailed(_))
    ));

    assert_eq!(backend.list("md/").await.unwrap(), vec!["md/k".to_string()]);
    assert!(matches!(
        backend.get("md/missing").await,
        Err(StorageError::NotFound(_))
    ));
}
