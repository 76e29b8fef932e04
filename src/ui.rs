//! Interface de terminal do TRAMITA: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`SaveProgress`] acompanha visualmente
//! a execução de um "salvar tudo" no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::engine::{ItemOutcome, ProcedureOverview, ProcedureSummary};
use crate::orchestrator::SaveAllReport;
use crate::state_machine::PermitStatus;

/// Estilo de cor para cada estado de permissão.
pub fn status_style(status: PermitStatus) -> Style {
    match status {
        PermitStatus::Completed => Style::new().green().bold(),
        PermitStatus::InProgress => Style::new().cyan(),
        PermitStatus::Sd | PermitStatus::Paid => Style::new().blue(),
        PermitStatus::Rejected => Style::new().red().bold(),
        PermitStatus::Pending => Style::new().yellow(),
    }
}

/// Indicador visual de progresso para um "salvar tudo".
///
/// Exibe um spinner durante o processamento e, ao final, uma linha por
/// item com falha (vermelho) e o resumo (verde ou amarelo).
pub struct SaveProgress {
    // Spinner do indicatif.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl SaveProgress {
    /// Inicia o spinner com a descrição informada.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(description.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Finaliza o spinner e exibe o resultado de cada fase.
    pub fn complete(&self, report: &SaveAllReport) {
        self.pb.finish_and_clear();
        self.section("Arquivos", &report.files);
        for stamp in &report.stamps {
            if let ItemOutcome::Failed { error, .. } = &stamp.outcome {
                println!(
                    "  {} documento {} ({}): {error}",
                    self.red.apply_to("✗"),
                    stamp.document_id,
                    stamp.section
                );
            }
        }
        self.section("Vencimentos", &report.expiry_updates);
        self.section("Comprovantes", &report.vouchers);
        self.section("Pagamentos", &report.payment_updates);

        let failures = report.failures();
        if failures == 0 {
            println!("  {} Tudo salvo", self.green.apply_to("✓"));
        } else {
            println!(
                "  {} Salvo com {failures} item(ns) com falha",
                self.yellow.apply_to("!")
            );
        }
    }

    fn section<T>(&self, label: &str, outcomes: &[ItemOutcome<T>]) {
        if outcomes.is_empty() {
            return;
        }
        let ok = outcomes.iter().filter(|o| o.value().is_some()).count();
        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Skipped { .. }))
            .count();
        println!(
            "  {label}: {} ok, {skipped} ignorado(s)",
            self.green.apply_to(ok)
        );
        for outcome in outcomes {
            if let ItemOutcome::Failed { index, kind, error } = outcome {
                println!("    {} #{index} {kind}: {error}", self.red.apply_to("✗"));
            }
        }
    }
}

/// Imprime a listagem de trâmites, uma linha por trâmite.
pub fn print_summaries(summaries: &[ProcedureSummary]) {
    if summaries.is_empty() {
        println!("Nenhum trâmite.");
        return;
    }
    let dim = Style::new().dim();
    for s in summaries {
        println!(
            "#{:<4} {:<20} {:<24} {} {}",
            s.id,
            s.shipment_code.as_deref().unwrap_or(&s.shipment_ref),
            s.client_name.as_deref().unwrap_or("-"),
            status_style(s.status).apply_to(format!("{:<12}", s.status)),
            dim.apply_to(format!(
                "{} permissão(ões), {} documento(s)",
                s.permit_count, s.document_count
            )),
        );
    }
}

/// Imprime o detalhamento de um trâmite por permissão e seção.
pub fn print_overview(overview: &ProcedureOverview) {
    let bold = Style::new().bold();
    let dim = Style::new().dim();
    let p = &overview.procedure;
    println!(
        "{} #{} {}",
        bold.apply_to("Trâmite"),
        p.id,
        overview.shipment_code.as_deref().unwrap_or(&p.shipment_ref)
    );
    println!(
        "  cliente: {}  entidade: {}",
        overview.client_name.as_deref().unwrap_or(&p.client_ref),
        overview.entity_name.as_deref().unwrap_or(&p.entity_ref)
    );

    for permit in &overview.permits {
        let a = &permit.association;
        println!();
        println!(
            "  {} {}",
            bold.apply_to(&permit.permit_type.name),
            status_style(a.status).apply_to(a.status)
        );
        println!(
            "    {}",
            dim.apply_to(format!(
                "início {}  fim {}  vencimento {}  dias {}",
                fmt_opt(a.milestones.start_date),
                fmt_opt(a.milestones.end_date),
                fmt_opt(a.milestones.expiry_date),
                fmt_opt(a.milestones.days),
            ))
        );
        for (label, docs) in [
            ("documentos", &permit.documents),
            ("fotos", &permit.photos),
            ("seguimento", &permit.tracking),
        ] {
            for d in docs {
                println!(
                    "    [{label}] #{} {} {}",
                    d.document.id,
                    d.document.name,
                    dim.apply_to(&d.url)
                );
            }
        }
    }

    if !overview.payments.is_empty() {
        println!();
        println!("  {}", bold.apply_to("Pagamento de serviço"));
        for view in &overview.payments {
            let amount = view
                .payment
                .as_ref()
                .map(|p| p.amount.to_string())
                .unwrap_or_else(|| "-".into());
            println!(
                "    #{} {} {amount} {}",
                view.document.document.id, view.document.document.name, view.verification
            );
        }
    }

    if !overview.receipts.is_empty() {
        println!();
        println!("  {}", bold.apply_to("Recibos"));
        for r in &overview.receipts {
            println!(
                "    #{} {:?} {} {}",
                r.id,
                r.kind,
                r.original_filename,
                fmt_opt(r.amount)
            );
        }
    }
}

/// Imprime qualquer registro como JSON formatado.
pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_render_as_dash() {
        assert_eq!(fmt_opt::<i64>(None), "-");
        assert_eq!(fmt_opt(Some(9)), "9");
    }

    #[test]
    fn every_status_has_a_style() {
        for status in PermitStatus::ALL {
            let rendered = status_style(status).apply_to(status).to_string();
            assert!(rendered.contains(status.as_str()));
        }
    }
}
