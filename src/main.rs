use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tramita::cli::{
    CategoryCommand, Cli, Command, DocCommand, PaymentCommand, PermitCommand, ProcedureCommand,
    ReceiptCommand,
};
use tramita::config::TramitaConfig;
use tramita::directory::StaticDirectory;
use tramita::manifest::{Manifest, read_upload};
use tramita::model::{
    CategoryId, CategoryRef, DocumentId, NewDocument, NewProcedure, NewReceipt, PaymentId,
    PaymentUpdate, PermitAttachment, PermitDates, PermitTypeId, ProcedureId, ProcedureUpdate,
    ReceiptFields, ReceiptId, ReceiptKind, VoucherInput,
};
use tramita::storage::LocalFileStorage;
use tramita::{Engine, SaveOrchestrator, snapshot, ui};

type LocalEngine = Engine<LocalFileStorage, StaticDirectory>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = TramitaConfig::load()?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    init_tracing(&config, cli.verbose);

    let tables = snapshot::load(&config.snapshot_path())
        .with_context(|| format!("loading {}", config.snapshot_path().display()))?;
    let storage = LocalFileStorage::new(config.storage_root(), config.public_base_url.clone());
    let engine = Engine::new(storage, config.directory.clone())
        .with_tables(tables)
        .with_default_status(config.initial_status()?);

    let read_only = cli.command.is_read_only();
    let result = run(cli.command, &engine).await;

    // Partial work from a failed command is still persisted.
    if !read_only {
        snapshot::save(&config.snapshot_path(), &engine.snapshot())
            .with_context(|| format!("saving {}", config.snapshot_path().display()))?;
    }
    result
}

fn init_tracing(config: &TramitaConfig, verbose: bool) {
    let fallback = if verbose { "debug" } else { config.log_filter.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(command: Command, engine: &LocalEngine) -> Result<()> {
    match command {
        Command::Procedure(cmd) => procedure(cmd, engine).await,
        Command::Permit(cmd) => permit(cmd, engine),
        Command::Category(cmd) => category(cmd, engine),
        Command::Doc(cmd) => doc(cmd, engine).await,
        Command::Save { manifest } => save(&manifest, engine).await,
        Command::Payment(cmd) => payment(cmd, engine).await,
        Command::Receipt(cmd) => receipt(cmd, engine).await,
    }
}

async fn procedure(cmd: ProcedureCommand, engine: &LocalEngine) -> Result<()> {
    match cmd {
        ProcedureCommand::List => ui::print_summaries(&engine.list_procedures()),
        ProcedureCommand::Show { id } => {
            ui::print_overview(&engine.list_procedure(ProcedureId(id))?);
        }
        ProcedureCommand::Create {
            shipment,
            client,
            entity,
            price,
            agent_fee,
        } => {
            let procedure = engine.create_procedure(NewProcedure {
                shipment_ref: shipment,
                client_ref: client,
                entity_ref: entity,
                total_price: price,
                agent_fee,
            })?;
            ui::print_json(&procedure);
        }
        ProcedureCommand::Update {
            id,
            price,
            agent_fee,
            status,
            dates,
        } => {
            let procedure = engine.update_procedure(
                ProcedureId(id),
                ProcedureUpdate {
                    total_price: price,
                    agent_fee,
                    status,
                    start_date: dates.start(),
                    end_date: dates.end(),
                    expiry_date: dates.expiry(),
                },
            )?;
            ui::print_json(&procedure);
        }
        ProcedureCommand::Delete { id } => {
            engine.delete_procedure(ProcedureId(id)).await?;
            println!("Trâmite #{id} excluído");
        }
    }
    Ok(())
}

fn permit(cmd: PermitCommand, engine: &LocalEngine) -> Result<()> {
    match cmd {
        PermitCommand::Register { name } => ui::print_json(&engine.register_permit_type(&name)?),
        PermitCommand::Catalog => ui::print_json(&engine.list_permit_types()),
        PermitCommand::Attach {
            procedure,
            permit_type,
            fee,
            status,
        } => {
            let associations = engine.attach_permit_types(
                ProcedureId(procedure),
                vec![PermitAttachment {
                    permit_type_id: PermitTypeId(permit_type),
                    entity_fee: fee,
                    status,
                }],
            )?;
            ui::print_json(&associations);
        }
        PermitCommand::Detach {
            procedure,
            permit_type,
        } => {
            engine.detach_permit_type(ProcedureId(procedure), PermitTypeId(permit_type))?;
            println!("Permissão {permit_type} desvinculada do trâmite #{procedure}");
        }
        PermitCommand::Status {
            procedure,
            permit_type,
            status,
        } => {
            let association = engine.set_permit_status(
                ProcedureId(procedure),
                PermitTypeId(permit_type),
                status,
            )?;
            ui::print_json(&association);
        }
        PermitCommand::Dates {
            procedure,
            permit_type,
            dates,
        } => {
            let association = engine.set_permit_dates(
                ProcedureId(procedure),
                PermitTypeId(permit_type),
                PermitDates {
                    start_date: dates.start(),
                    end_date: dates.end(),
                    expiry_date: dates.expiry(),
                },
            )?;
            ui::print_json(&association);
        }
    }
    Ok(())
}

fn category(cmd: CategoryCommand, engine: &LocalEngine) -> Result<()> {
    match cmd {
        CategoryCommand::List { procedure } => {
            ui::print_json(&engine.list_categories(ProcedureId(procedure))?);
        }
        CategoryCommand::Create {
            procedure,
            name,
            section,
            permit_type,
        } => {
            let id = engine.resolve_or_create_category(
                ProcedureId(procedure),
                &name,
                section,
                permit_type.map(PermitTypeId),
            )?;
            println!("{id}");
        }
        CategoryCommand::Delete { id } => {
            engine.delete_category(CategoryId(id))?;
            println!("Categoria {id} excluída");
        }
    }
    Ok(())
}

async fn doc(cmd: DocCommand, engine: &LocalEngine) -> Result<()> {
    match cmd {
        DocCommand::Add {
            procedure,
            file,
            section,
            permit_type,
            category_id,
            category,
            name,
        } => {
            let category = match (category_id, category) {
                (Some(id), _) => CategoryRef::Existing(CategoryId(id)),
                (None, Some(name)) => CategoryRef::New(name),
                (None, None) => anyhow::bail!("--category or --category-id is required"),
            };
            let mut upload = read_upload(Path::new("."), &file).await;
            upload.name = name;
            let document = engine
                .create_document(NewDocument {
                    procedure_id: ProcedureId(procedure),
                    category,
                    permit_type_id: permit_type.map(PermitTypeId),
                    section,
                    file: upload,
                })
                .await?;
            ui::print_json(&document);
        }
        DocCommand::List {
            procedure,
            section,
            permit_type,
        } => {
            let documents = engine.list_documents(
                ProcedureId(procedure),
                section,
                permit_type.map(PermitTypeId),
            )?;
            ui::print_json(&documents);
        }
        DocCommand::Url { id } => println!("{}", engine.document_url(DocumentId(id))?),
        DocCommand::Delete { id } => match engine.delete_document(DocumentId(id)).await? {
            Some(status) => println!(
                "Documento {id} excluído; estado recalculado: {}",
                ui::status_style(status).apply_to(status)
            ),
            None => println!("Documento {id} excluído"),
        },
    }
    Ok(())
}

async fn save(manifest_path: &Path, engine: &LocalEngine) -> Result<()> {
    let manifest = Manifest::from_path(manifest_path)
        .await
        .with_context(|| format!("reading manifest {}", manifest_path.display()))?;
    let base = manifest_path.parent().unwrap_or(Path::new("."));
    let request = manifest.into_request(base).await;

    let progress = ui::SaveProgress::start(&format!("Salvando trâmite #{}", request.procedure_id));
    let report = SaveOrchestrator::new(engine).save_all(request).await?;
    progress.complete(&report);
    Ok(())
}

async fn payment(cmd: PaymentCommand, engine: &LocalEngine) -> Result<()> {
    match cmd {
        PaymentCommand::Verify { document, status } => {
            ui::print_json(&engine.upsert_verification(DocumentId(document), status)?);
        }
        PaymentCommand::Voucher {
            procedure,
            file,
            amount,
            bank,
            date,
        } => {
            let upload = read_upload(Path::new("."), &file).await;
            let outcomes = engine
                .ingest_vouchers(
                    ProcedureId(procedure),
                    vec![VoucherInput {
                        file: Some(upload),
                        amount: Some(amount),
                        bank,
                        date,
                    }],
                )
                .await;
            ui::print_json(&outcomes);
        }
        PaymentCommand::Update {
            id,
            amount,
            date,
            note,
        } => {
            let payment = engine.update_payment(
                PaymentId(id),
                PaymentUpdate {
                    amount,
                    payment_date: date,
                    note,
                },
            )?;
            ui::print_json(&payment);
        }
    }
    Ok(())
}

async fn receipt(cmd: ReceiptCommand, engine: &LocalEngine) -> Result<()> {
    match cmd {
        ReceiptCommand::Add {
            procedure,
            file,
            entity_fee,
            agent_fee: _,
            fields,
        } => {
            let kind = match entity_fee {
                Some(permit_type) => ReceiptKind::EntityFee {
                    permit_type_id: PermitTypeId(permit_type),
                },
                None => ReceiptKind::AgentFee,
            };
            let receipt = engine
                .create_receipt(NewReceipt {
                    procedure_id: ProcedureId(procedure),
                    kind,
                    file: read_upload(Path::new("."), &file).await,
                    fields: ReceiptFields {
                        amount: fields.amount,
                        bank: fields.bank,
                        closing_date: fields.closing_date,
                    },
                })
                .await?;
            ui::print_json(&receipt);
        }
        ReceiptCommand::Update { id, fields } => {
            let receipt = engine.update_receipt(
                ReceiptId(id),
                ReceiptFields {
                    amount: fields.amount,
                    bank: fields.bank,
                    closing_date: fields.closing_date,
                },
            )?;
            ui::print_json(&receipt);
        }
        ReceiptCommand::Replace { id, file } => {
            let upload = read_upload(Path::new("."), &file).await;
            ui::print_json(&engine.replace_receipt_file(ReceiptId(id), upload).await?);
        }
        ReceiptCommand::Delete { id } => {
            engine.delete_receipt(ReceiptId(id)).await?;
            println!("Recibo {id} excluído");
        }
    }
    Ok(())
}
