//! Component object utilities
//!
//! GUID tooling and a scripted walk-through of the identity, lifetime and
//! factory contracts.
//!
//! Run with: cargo run --bin com-utils -- demo --instances 4 --threads 8

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use com_core::{hresult, Aggregation, ComError, ComPtr, Guid, ModuleConfig, ServerModule};
use com_utils::{Panel, Widget, CLSID_PANEL, CLSID_WIDGET, IA, IB, IPanel};

#[derive(Parser)]
#[command(name = "com-utils")]
#[command(about = "Component object model utilities")]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// GUID tooling
    Guid {
        #[command(subcommand)]
        command: GuidCommand,
    },
    /// Walk through object creation, sharing and aggregation
    Demo {
        /// Widgets to create
        #[arg(short, long, default_value = "4")]
        instances: usize,

        /// Threads sharing the widgets
        #[arg(short, long, default_value = "8")]
        threads: usize,

        /// Upper bound on live instances in the module
        #[arg(long)]
        max_instances: Option<usize>,
    },
}

#[derive(Subcommand)]
enum GuidCommand {
    /// Generate random GUIDs
    New {
        /// Number of GUIDs
        #[arg(short, long, default_value = "1")]
        count: usize,

        /// Print in registry form, with braces
        #[arg(short, long)]
        braces: bool,
    },
    /// Parse a GUID and print its forms
    Parse {
        /// GUID text, with or without braces
        text: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Set up logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Guid { command } => guid(command)?,
        Command::Demo {
            instances,
            threads,
            max_instances,
        } => demo(instances, threads, max_instances)?,
    }

    Ok(())
}

fn guid(command: GuidCommand) -> com_core::Result<()> {
    match command {
        GuidCommand::New { count, braces } => {
            for _ in 0..count {
                let guid = Guid::generate();
                if braces {
                    println!("{{{}}}", guid);
                } else {
                    println!("{}", guid);
                }
            }
        }
        GuidCommand::Parse { text } => {
            let guid: Guid = text.parse()?;
            let bytes: Vec<String> = guid.to_bytes_le().iter().map(|b| format!("{:02x}", b)).collect();
            println!("canonical: {}", guid);
            println!("lowercase: {:x}", guid);
            println!("data1:     0x{:08x}", guid.data1);
            println!("data2:     0x{:04x}", guid.data2);
            println!("data3:     0x{:04x}", guid.data3);
            println!("data4:     {:02x?}", guid.data4);
            println!("bytes(le): {}", bytes.join(" "));
            println!("nil:       {}", guid.is_nil());
        }
    }
    Ok(())
}

fn demo(instances: usize, threads: usize, max_instances: Option<usize>) -> com_core::Result<()> {
    let mut config = ModuleConfig::new("com-utils");
    if let Some(max) = max_instances {
        config = config.with_max_instances(max);
    }
    let module = ServerModule::new(config);

    let names = Arc::new(AtomicUsize::new(0));
    module.register_class(
        move || Ok(Widget::new(format!("widget-{}", names.fetch_add(1, Ordering::Relaxed)))),
        Aggregation::Supported,
    )?;
    module.register_class(|| Ok(Panel::new("main panel")), Aggregation::NotSupported)?;
    info!("Registered classes: {:?}", module.registered_classes());

    let widgets = module.class_factory(&CLSID_WIDGET)?;
    let lock = widgets.lock()?;
    info!("Server locked: locks={}", module.lock_count());

    // Creation
    let mut created: Vec<ComPtr<dyn IA>> = Vec::with_capacity(instances);
    for _ in 0..instances {
        match widgets.create::<dyn IA>() {
            Ok(widget) => created.push(widget),
            Err(ComError::OutOfMemory) => {
                warn!("Instance limit reached after {} widgets", created.len());
                break;
            }
            Err(e) => return Err(e),
        }
    }
    info!("Created {} widgets: instances={}", created.len(), module.instance_count());

    // Sharing across threads: every thread holds its own references
    thread::scope(|scope| {
        for id in 0..threads {
            let created = &created;
            scope.spawn(move || {
                for widget in created {
                    let mine = widget.clone();
                    mine.increment();
                    match mine.query::<dyn IB>() {
                        Ok(b) if b.is_same_object(&mine) => {}
                        Ok(_) => warn!("Thread {}: IB view reports another identity", id),
                        Err(e) => warn!("Thread {}: IB query failed: {}", id, e),
                    }
                }
            });
        }
    });
    for widget in &created {
        let b = widget.query::<dyn IB>()?;
        info!("  {}", b.describe());
    }
    drop(created);
    info!("Widgets released: instances={}", module.instance_count());

    // Aggregation
    let panels = module.class_factory(&CLSID_PANEL)?;
    let panel = panels.create::<dyn IPanel>()?;
    let inner = widgets.create_aggregate(&panel.identity()?)?;
    panel.attach(inner)?;
    let a = panel.query::<dyn IA>()?;
    a.increment();
    let b = a.query::<dyn IB>()?;
    info!(
        "Panel '{}' aggregates {}; same identity: {}",
        panel.title(),
        b.describe(),
        b.is_same_object(&panel)
    );

    match panels.create_aggregate(&widgets.create::<dyn IA>()?.identity()?) {
        Err(e) => info!("Aggregating a panel fails as expected: {} (0x{:08x})", e, e.hresult()),
        Ok(_) => warn!("Panel unexpectedly accepted aggregation"),
    }
    info!(
        "HRESULT of a successful creation: 0x{:08x}",
        hresult::from_result(&widgets.create::<dyn IB>())
    );

    drop((a, b, panel));
    drop(lock);
    info!(
        "Done: locks={}, instances={}, can unload: {}",
        module.lock_count(),
        module.instance_count(),
        module.can_unload_now()
    );
    Ok(())
}
