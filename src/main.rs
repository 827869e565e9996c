use blobsync::cli::{Cli, Command, TransferArgs};
use blobsync::config::split_container_spec;
use blobsync::logging::{init_logging, LogConfig};
use blobsync::{
    create_provider, AccessLevel, FingerprintPolicy, FolderScanner, Provider as _, RootContext,
    Storage as _, StorageTarget, SyncConfig, SyncEngine, SyncError, SyncReport,
};
use clap::Parser;
use futures::StreamExt;
use tokio_util::io::ReaderStream;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig {
        level: cli.log_level.clone(),
        log_dir: cli.log_dir.clone(),
    };
    let _guard = init_logging(&log_config);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32, SyncError> {
    let conn = cli
        .connection_string
        .ok_or_else(|| SyncError::config("connection string is not inserted"))?;
    let target = StorageTarget::parse(&conn)?;
    let provider = create_provider(&target).map_err(SyncError::Provider)?;

    match cli.command {
        Command::Create { container, access } => {
            let access: AccessLevel = access.parse()?;
            provider
                .create_container(&container, access)
                .await
                .map_err(SyncError::Provider)?;
            println!("Created: {}", container);
        }
        Command::Remove { container } => {
            provider
                .remove_container(&container)
                .await
                .map_err(SyncError::Provider)?;
            println!("Deleted: {}", container);
        }
        Command::List { container: None } => {
            let containers = provider.list_containers().await.map_err(SyncError::Provider)?;
            for c in &containers {
                println!("{}\t{}", c.name, c.public_access.as_deref().unwrap_or("private"));
            }
            println!("Total: {}", containers.len());
        }
        Command::List {
            container: Some(spec),
        } => {
            let (container, prefix) = split_container_spec(&spec);
            let storage = provider
                .container(container)
                .await
                .map_err(SyncError::Provider)?;
            let objects = storage
                .list_objects(prefix)
                .await
                .map_err(SyncError::Provider)?;
            for o in &objects {
                println!("{}\t{}", o.path, o.size);
            }
            println!("Total: {}", objects.len());
        }
        Command::Upload {
            container,
            folder,
            transfer,
        } => {
            let ctx = RootContext::new(&container, &folder)?;
            let manifest = FolderScanner::scan(&ctx.folder_path).await?;
            let storage = provider
                .container(&ctx.container_name)
                .await
                .map_err(SyncError::Provider)?;
            let engine = SyncEngine::with_config(sync_config(&transfer));
            let report = engine.upload_all(&manifest, storage).await;
            print_report(&report, transfer.json)?;
            return Ok(exit_code(&report));
        }
        Command::Download {
            container,
            folder,
            transfer,
        } => {
            let ctx = RootContext::new(&container, &folder)?;
            let storage = provider
                .container(&ctx.container_name)
                .await
                .map_err(SyncError::Provider)?;
            let engine = SyncEngine::with_config(sync_config(&transfer));
            let report = engine.download_all(storage, &ctx.folder_path).await?;
            print_report(&report, transfer.json)?;
            return Ok(exit_code(&report));
        }
        Command::Delete { spec } => {
            let (container, prefix) = split_container_spec(&spec);
            // 无前缀的删除会清空整个容器，必须显式写出对象路径
            let prefix =
                prefix.ok_or_else(|| SyncError::config("blob path is not inserted"))?;
            let storage = provider
                .container(container)
                .await
                .map_err(SyncError::Provider)?;
            let objects = storage
                .list_objects(Some(prefix))
                .await
                .map_err(SyncError::Provider)?;
            for o in &objects {
                storage.delete(&o.path).await.map_err(SyncError::Provider)?;
                println!("Deleted: {}", o.path);
            }
            println!("Total: {}", objects.len());
        }
        Command::Sas {
            container,
            blob,
            permissions,
            expiry,
        } => {
            let signed = provider
                .signed_url(&container, &blob, &permissions, expiry)
                .map_err(SyncError::Provider)?;
            println!("{}", signed.url);
        }
        Command::Put {
            container,
            name,
            uuid,
            prefix,
        } => {
            let storage = provider
                .container(&container)
                .await
                .map_err(SyncError::Provider)?;
            let engine = SyncEngine::new();
            let stream = ReaderStream::new(tokio::io::stdin())
                .map(|chunk| chunk.map_err(anyhow::Error::from));
            let key = engine
                .upload_stream(storage, Box::pin(stream), &name, uuid, &prefix)
                .await?;
            println!("Uploaded: {}", key);
        }
    }

    Ok(0)
}

fn sync_config(transfer: &TransferArgs) -> SyncConfig {
    SyncConfig {
        max_concurrent_transfers: transfer.concurrency.max(1),
        policy: if transfer.size_only {
            FingerprintPolicy::Size
        } else {
            FingerprintPolicy::Checksum
        },
        max_retries: transfer.retries,
        ..SyncConfig::default()
    }
}

fn print_report(report: &SyncReport, json: bool) -> Result<(), SyncError> {
    if json {
        let rendered = serde_json::to_string_pretty(report)
            .map_err(|e| SyncError::Provider(e.into()))?;
        println!("{}", rendered);
        return Ok(());
    }

    println!(
        "Transferred: {}, Refreshed: {}, Existed: {}, Failed: {} ({}s)",
        report.transferred, report.refreshed, report.skipped, report.failed, report.duration
    );
    for outcome in &report.outcomes {
        if let blobsync::EntryStatus::Failed(reason) = &outcome.status {
            eprintln!("Failed: {} - {}", outcome.key, reason);
        }
    }
    Ok(())
}

fn exit_code(report: &SyncReport) -> i32 {
    if report.failed > 0 {
        1
    } else {
        0
    }
}
