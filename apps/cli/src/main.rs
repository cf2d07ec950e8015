//! Metalforge CLI
//!
//! Administrative tool: inspect the device catalog, dry-run classification,
//! browse workflow history, and smoke-test templates against stub adapters.

use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use metalforge_adapters::stub::StubAdapters;
use metalforge_adapters::MaasClient;
use metalforge_catalog::{classify, Catalog, CatalogHandle};
use metalforge_db::{HistoryStore, InMemoryHistoryStore, SqliteHistoryStore};
use metalforge_domain::{HardwareFacts, HistoryFilter, ProgressKind};
use metalforge_engine::{
    CreateWorkflowRequest, ManagerConfig, WorkflowFactory, WorkflowManager,
};

#[derive(Parser)]
#[command(name = "metalforge")]
#[command(about = "Metalforge provisioning administration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Device catalog inspection
    Catalog {
        /// Path of the catalog YAML document
        #[arg(long, default_value = "catalog.yaml")]
        catalog: String,

        #[command(subcommand)]
        action: CatalogCommands,
    },
    /// Classify hardware facts against the catalog
    Classify {
        /// Path of the catalog YAML document
        #[arg(long, default_value = "catalog.yaml")]
        catalog: String,

        #[arg(long)]
        manufacturer: Option<String>,

        #[arg(long)]
        product_name: Option<String>,

        #[arg(long)]
        cpu_model: Option<String>,

        #[arg(long)]
        cpu_cores: Option<u32>,

        #[arg(long)]
        memory_gib: Option<u32>,
    },
    /// Workflow history inspection
    History {
        /// Path of the history database
        #[arg(long, default_value = "metalforge.db")]
        db: String,

        #[command(subcommand)]
        action: HistoryCommands,
    },
    /// Dry-run a workflow template against stub adapters
    Run {
        /// Path of the catalog YAML document
        #[arg(long, default_value = "catalog.yaml")]
        catalog: String,

        #[arg(long, default_value = "basic_provisioning")]
        template: String,

        #[arg(long)]
        server_id: String,

        #[arg(long)]
        device_type: Option<String>,

        #[arg(long)]
        target_ipmi_ip: Option<String>,

        #[arg(long)]
        firmware_first: bool,
    },
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// List all device types
    List,
    /// Show one device type
    Show { id: String },
    /// Search device types by substring
    Search { query: String },
    /// Show resolved firmware methods for a device type
    Methods { id: String },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List history rows
    List {
        #[arg(long)]
        server_id: Option<String>,
    },
    /// Show one history row
    Show { workflow_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Catalog { catalog, action } => catalog_command(&catalog, action),
        Commands::Classify {
            catalog,
            manufacturer,
            product_name,
            cpu_model,
            cpu_cores,
            memory_gib,
        } => {
            let catalog = load_catalog(&catalog)?;
            let facts = HardwareFacts {
                manufacturer,
                product_name,
                cpu_model,
                cpu_cores,
                memory_total_gib: memory_gib,
            };
            let result = classify(&facts, &catalog);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::History { db, action } => history_command(&db, action).await,
        Commands::Run {
            catalog,
            template,
            server_id,
            device_type,
            target_ipmi_ip,
            firmware_first,
        } => {
            run_command(
                &catalog,
                &template,
                &server_id,
                device_type,
                target_ipmi_ip,
                firmware_first,
            )
            .await
        }
    }
}

fn load_catalog(path: &str) -> anyhow::Result<Catalog> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading catalog from {path}"))?;
    Catalog::load(&source).context("parsing catalog")
}

fn catalog_command(path: &str, action: CatalogCommands) -> anyhow::Result<()> {
    let catalog = load_catalog(path)?;

    match action {
        CatalogCommands::List => {
            for dt in catalog.list_device_types() {
                println!("{:<20} {:<12} {:<20} {}", dt.id, dt.vendor, dt.motherboard, dt.description);
            }
        }
        CatalogCommands::Show { id } => {
            let dt = catalog.get_device_type(&id)?;
            println!("id:          {}", dt.id);
            println!("description: {}", dt.description);
            println!("vendor:      {} ({})", dt.vendor, dt.vendor_display_name);
            println!("motherboard: {}", dt.motherboard);
            if let Some(cpu) = &dt.hardware_spec.cpu_model {
                println!("cpu:         {cpu}");
            }
            if let Some(cores) = dt.hardware_spec.cpu_cores {
                println!("cores:       {cores}");
            }
            if let Some(memory) = dt.hardware_spec.memory_gib {
                println!("memory:      {memory} GiB");
            }
            if let Some(template) = &dt.bios_template {
                println!("bios:        {template}");
            }
        }
        CatalogCommands::Search { query } => {
            for dt in catalog.search(&query) {
                println!("{:<20} {}", dt.id, dt.description);
            }
        }
        CatalogCommands::Methods { id } => {
            for (component, descriptor) in catalog.get_firmware_methods(&id)? {
                println!(
                    "{:<10} {:<20} {}",
                    component,
                    descriptor.method,
                    descriptor.version.unwrap_or_default(),
                );
            }
        }
    }

    Ok(())
}

async fn history_command(db: &str, action: HistoryCommands) -> anyhow::Result<()> {
    let pool = metalforge_db::connect(db).await.context("opening database")?;
    let store = SqliteHistoryStore::new(pool);
    store.init_schema().await?;

    match action {
        HistoryCommands::List { server_id } => {
            let mut filter = HistoryFilter::default();
            if let Some(server_id) = server_id {
                filter = filter.with_server(server_id);
            }
            for record in store.list(filter).await? {
                println!(
                    "{:<50} {:<10} {}/{} {}",
                    record.workflow_id,
                    record.status,
                    record.steps_completed,
                    record.total_steps,
                    record.started_at,
                );
            }
        }
        HistoryCommands::Show { workflow_id } => {
            let record = store.get(&workflow_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}

async fn run_command(
    catalog: &str,
    template: &str,
    server_id: &str,
    device_type: Option<String>,
    target_ipmi_ip: Option<String>,
    firmware_first: bool,
) -> anyhow::Result<()> {
    let catalog = CatalogHandle::new(load_catalog(catalog)?);
    let stubs = StubAdapters::new();

    // Templates that skip commissioning expect the machine to already be
    // enlisted; seed the stub controller accordingly.
    stubs.maas.commission(server_id).await.ok();

    let manager = Arc::new(WorkflowManager::new(
        catalog,
        stubs.registry(),
        Arc::new(InMemoryHistoryStore::new()) as Arc<dyn HistoryStore>,
        WorkflowFactory::new(),
        ManagerConfig::default(),
        "default",
    ));

    let mut request =
        CreateWorkflowRequest::new(template, server_id).with_firmware_first(firmware_first);
    if let Some(device_type) = device_type {
        request = request.with_device_type(device_type);
    }
    if let Some(target) = target_ipmi_ip {
        request = request.with_ipmi_target(target, None);
    }

    let mut sub = manager.subscribe_all();
    let workflow_id = manager.create_workflow(request).await?;
    println!("started {workflow_id}");

    loop {
        let Some(event) = sub.recv().await else { break };
        if event.workflow_id != workflow_id {
            continue;
        }

        match event.kind {
            ProgressKind::SubTask => {
                println!("    .. {}", event.payload.unwrap_or_default());
            }
            ProgressKind::StepStart => {
                println!("  -> {}", event.step_name.unwrap_or_default());
            }
            ProgressKind::StepEnd => {
                if let Some(payload) = event.payload {
                    println!("  <- {} ({payload})", event.step_name.unwrap_or_default());
                } else {
                    println!("  <- {}", event.step_name.unwrap_or_default());
                }
            }
            ProgressKind::WorkflowEnd => {
                println!("done: {}", event.payload.unwrap_or_default());
                break;
            }
            ProgressKind::WorkflowStart | ProgressKind::Cancellation => {}
        }
    }

    manager.wait(&workflow_id).await;
    let snapshot = manager
        .get_workflow(&workflow_id)
        .await
        .context("workflow vanished")?;
    println!(
        "{} finished with status {} ({}/{} steps)",
        workflow_id,
        snapshot.status,
        snapshot.steps_completed,
        snapshot.steps_total,
    );

    Ok(())
}
