//! Opens the configured warehouse backend

use anyhow::{bail, Context, Result};
use tracing::info;
use wxetl_core::Warehouse;
use wxetl_db::{DbConnectionBuilder, MySqlWarehouse, SqliteWarehouse};
use wxetl_sinks::{FsWarehouse, MemoryWarehouse};

use crate::config::WarehouseTarget;

pub async fn open_warehouse(target: &WarehouseTarget) -> Result<Box<dyn Warehouse>> {
    let warehouse: Box<dyn Warehouse> = match target {
        WarehouseTarget::Url(url) => open_url(url).await?,
        WarehouseTarget::MySql {
            host,
            port,
            database,
            username,
            password,
        } => {
            let mut builder = DbConnectionBuilder::new(database.as_str())
                .host(host.as_str())
                .port(*port);
            if let Some(username) = username {
                builder = builder.username(username.as_str());
            }
            if let Some(password) = password {
                builder = builder.password(password.as_str());
            }
            let db = MySqlWarehouse::with_options(builder.build()?)
                .await
                .context("Failed to connect to database")?;
            db.ping().await.context("Database ping failed")?;
            Box::new(db)
        }
    };

    info!("Warehouse ready: {}", warehouse.name());
    Ok(warehouse)
}

async fn open_url(url: &str) -> Result<Box<dyn Warehouse>> {
    if url.starts_with("mysql://") {
        let db = MySqlWarehouse::connect(url)
            .await
            .context("Failed to connect to database")?;
        db.ping().await.context("Database ping failed")?;
        Ok(Box::new(db))
    } else if url.starts_with("sqlite:") {
        let db = SqliteWarehouse::connect(url)
            .await
            .with_context(|| format!("Failed to open {}", url))?;
        Ok(Box::new(db))
    } else if let Some(dir) = url.strip_prefix("jsonl://") {
        Ok(Box::new(FsWarehouse::new(dir)?))
    } else if url == "memory://" {
        Ok(Box::new(MemoryWarehouse::new()))
    } else {
        bail!("Unsupported warehouse url: {}", url)
    }
}
