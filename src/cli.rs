//! Interface de linha de comando do TRAMITA baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (procedure, permit,
//! category, doc, save, payment, receipt) e flags globais (--verbose,
//! --data-dir). Cada subcomando corresponde a uma operação do motor.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

use crate::model::{Section, VerificationStatus};
use crate::state_machine::PermitStatus;

/// TRAMITA: motor de trâmites de permissões aduaneiras.
#[derive(Debug, Parser)]
#[command(name = "tramita", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Diretório de dados (sobrepõe `tramita.toml` e `TRAMITA_DATA_DIR`).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Trâmites: abrir, listar, alterar e excluir.
    #[command(subcommand)]
    Procedure(ProcedureCommand),

    /// Catálogo de permissões e vínculo com trâmites.
    #[command(subcommand)]
    Permit(PermitCommand),

    /// Categorias de documentos de um trâmite.
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Documentos individuais.
    #[command(subcommand)]
    Doc(DocCommand),

    /// Executa o "salvar tudo" descrito em um manifesto JSON.
    Save {
        /// Caminho do manifesto.
        manifest: PathBuf,
    },

    /// Pagamentos de serviço e sua verificação.
    #[command(subcommand)]
    Payment(PaymentCommand),

    /// Recibos de taxa da entidade e honorários do tramitador.
    #[command(subcommand)]
    Receipt(ReceiptCommand),
}

#[derive(Debug, Subcommand)]
pub enum ProcedureCommand {
    /// Lista todos os trâmites.
    List,
    /// Mostra o detalhamento completo de um trâmite.
    Show { id: u64 },
    /// Abre um novo trâmite.
    Create {
        #[arg(long)]
        shipment: String,
        #[arg(long)]
        client: String,
        #[arg(long, default_value = "")]
        entity: String,
        #[arg(long)]
        price: Option<Decimal>,
        #[arg(long)]
        agent_fee: Option<Decimal>,
    },
    /// Altera campos de um trâmite.
    Update {
        id: u64,
        #[arg(long)]
        price: Option<Decimal>,
        #[arg(long)]
        agent_fee: Option<Decimal>,
        /// Estado geral (substituição manual).
        #[arg(long)]
        status: Option<PermitStatus>,
        #[command(flatten)]
        dates: DateArgs,
    },
    /// Exclui um trâmite e tudo o que ele possui.
    Delete { id: u64 },
}

#[derive(Debug, Subcommand)]
pub enum PermitCommand {
    /// Registra um tipo de permissão no catálogo.
    Register { name: String },
    /// Lista o catálogo de permissões.
    Catalog,
    /// Vincula um tipo de permissão a um trâmite.
    Attach {
        procedure: u64,
        permit_type: u64,
        /// Taxa devida à entidade.
        #[arg(long)]
        fee: Option<Decimal>,
        /// Estado inicial (padrão: o configurado).
        #[arg(long)]
        status: Option<PermitStatus>,
    },
    /// Desvincula um tipo de permissão.
    Detach { procedure: u64, permit_type: u64 },
    /// Define manualmente o estado de uma permissão.
    Status {
        procedure: u64,
        permit_type: u64,
        status: PermitStatus,
    },
    /// Define manualmente as datas de uma permissão.
    Dates {
        procedure: u64,
        permit_type: u64,
        #[command(flatten)]
        dates: DateArgs,
    },
}

/// Datas opcionais; `--clear-*` apaga a data correspondente.
#[derive(Debug, Clone, Default, Args)]
pub struct DateArgs {
    #[arg(long)]
    pub start: Option<NaiveDate>,
    #[arg(long)]
    pub end: Option<NaiveDate>,
    #[arg(long)]
    pub expiry: Option<NaiveDate>,
    #[arg(long, conflicts_with = "start")]
    pub clear_start: bool,
    #[arg(long, conflicts_with = "end")]
    pub clear_end: bool,
    #[arg(long, conflicts_with = "expiry")]
    pub clear_expiry: bool,
}

impl DateArgs {
    fn pick(value: Option<NaiveDate>, clear: bool) -> Option<Option<NaiveDate>> {
        if clear { Some(None) } else { value.map(Some) }
    }

    pub fn start(&self) -> Option<Option<NaiveDate>> {
        Self::pick(self.start, self.clear_start)
    }

    pub fn end(&self) -> Option<Option<NaiveDate>> {
        Self::pick(self.end, self.clear_end)
    }

    pub fn expiry(&self) -> Option<Option<NaiveDate>> {
        Self::pick(self.expiry, self.clear_expiry)
    }
}

#[derive(Debug, Subcommand)]
pub enum CategoryCommand {
    /// Lista as categorias de um trâmite.
    List { procedure: u64 },
    /// Obtém ou cria uma categoria.
    Create {
        procedure: u64,
        name: String,
        #[arg(long)]
        section: Section,
        #[arg(long)]
        permit_type: Option<u64>,
    },
    /// Exclui uma categoria vazia.
    Delete { id: u64 },
}

#[derive(Debug, Subcommand)]
pub enum DocCommand {
    /// Envia um arquivo para um trâmite.
    Add {
        procedure: u64,
        file: PathBuf,
        #[arg(long)]
        section: Section,
        #[arg(long)]
        permit_type: Option<u64>,
        /// Categoria existente.
        #[arg(long, conflicts_with = "category")]
        category_id: Option<u64>,
        /// Nome de categoria a obter ou criar.
        #[arg(long, required_unless_present = "category_id")]
        category: Option<String>,
        /// Nome declarado do documento.
        #[arg(long)]
        name: Option<String>,
    },
    /// Lista documentos, opcionalmente filtrados.
    List {
        procedure: u64,
        #[arg(long)]
        section: Option<Section>,
        #[arg(long)]
        permit_type: Option<u64>,
    },
    /// Mostra a URL de um documento.
    Url { id: u64 },
    /// Exclui um documento e recalcula o estado da permissão.
    Delete { id: u64 },
}

#[derive(Debug, Subcommand)]
pub enum PaymentCommand {
    /// Define o estado de verificação de um comprovante.
    Verify {
        document: u64,
        status: VerificationStatus,
    },
    /// Registra um comprovante de pagamento de serviço.
    Voucher {
        procedure: u64,
        file: PathBuf,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        bank: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Altera valor, data ou observação de um pagamento.
    Update {
        id: u64,
        #[arg(long)]
        amount: Option<Decimal>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct ReceiptFieldArgs {
    #[arg(long)]
    pub amount: Option<Decimal>,
    #[arg(long)]
    pub bank: Option<String>,
    #[arg(long)]
    pub closing_date: Option<NaiveDate>,
}

#[derive(Debug, Subcommand)]
pub enum ReceiptCommand {
    /// Registra um recibo.
    Add {
        procedure: u64,
        file: PathBuf,
        /// Recibo da taxa da entidade para este tipo de permissão.
        #[arg(long, conflicts_with = "agent_fee")]
        entity_fee: Option<u64>,
        /// Recibo dos honorários do tramitador.
        #[arg(long, required_unless_present = "entity_fee")]
        agent_fee: bool,
        #[command(flatten)]
        fields: ReceiptFieldArgs,
    },
    /// Altera campos sem reenviar o arquivo.
    Update {
        id: u64,
        #[command(flatten)]
        fields: ReceiptFieldArgs,
    },
    /// Substitui o arquivo de um recibo.
    Replace { id: u64, file: PathBuf },
    /// Exclui um recibo.
    Delete { id: u64 },
}

impl Command {
    /// Comandos somente leitura não regravam o snapshot.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Command::Procedure(ProcedureCommand::List | ProcedureCommand::Show { .. })
                | Command::Permit(PermitCommand::Catalog)
                | Command::Category(CategoryCommand::List { .. })
                | Command::Doc(DocCommand::List { .. } | DocCommand::Url { .. })
        )
    }
}
