use libincentive::checkout::CheckoutReport;
use libincentive::choice::{ChoiceStatus, UpdateChoice};
use libincentive::evaluator::Evaluation;
use libincentive::promotion::{ContributionRule, Promotion, SideEffect};
use libincentive::token::Token;
use prettytable::{
    format::{LinePosition, LineSeparator, TableFormat},
    row, Table,
};

fn markdown_format() -> TableFormat {
    prettytable::format::FormatBuilder::new()
        .column_separator('|')
        .borders('|')
        .separator(LinePosition::Title, LineSeparator::new('-', '|', '|', '|'))
        .padding(1, 1)
        .build()
}

fn markdown_table() -> Table {
    let mut table = Table::new();
    table.set_format(markdown_format());
    table
}

fn side_effect(effect: Option<&SideEffect>) -> String {
    match effect {
        Some(SideEffect::Reward { description, .. }) => description.clone(),
        None => String::new(),
    }
}

fn contribution(rule: &ContributionRule, promotion: &Promotion) -> String {
    let label = |dimension: usize| promotion.dimensions.get(dimension).cloned().unwrap_or_else(|| "?".into());
    match rule {
        ContributionRule::PerItem { item_id, dimension, points_per_unit } => {
            format!("{points_per_unit} {} per {item_id}", label(*dimension))
        }
        ContributionRule::PerSpend { dimension, cents_per_point } => {
            format!("1 {} per {cents_per_point} cents", label(*dimension))
        }
    }
}

pub fn promotions_table(promotions: &[Promotion]) -> String {
    let mut table = markdown_table();
    table.set_titles(row!["Promotion", "Name", "Earns", "Update", "Description", "Reward"]);
    for promotion in promotions {
        let earns = promotion.contributions.iter().map(|c| contribution(c, promotion)).collect::<Vec<_>>().join("\n");
        let earns = if promotion.native_earn { earns } else { format!("{earns}\n(no plain earn)") };
        table.add_row(row![promotion.promotion_id, promotion.name, earns, "", "", ""]);
        for rule in &promotion.rules {
            table.add_row(row!["", "", "", rule.update_id, rule.description, side_effect(rule.side_effect.as_ref())]);
        }
    }
    table.to_string()
}

pub fn tokens_table(tokens: &[Token]) -> String {
    let mut table = markdown_table();
    table.set_titles(row!["Promotion", "Points", "Credential"]);
    for token in tokens {
        table.add_row(row![token.promotion_id, token.points, token.fingerprint()]);
    }
    table.to_string()
}

pub fn evaluation_table(evaluation: &Evaluation) -> String {
    let mut table = markdown_table();
    table.set_titles(row!["Promotion", "Contribution", "", "Choice", "Description", "Reward"]);
    for (promotion_id, state) in evaluation {
        match state {
            Ok(state) => {
                for (i, update) in state.updates.iter().enumerate() {
                    let marker = match update.status {
                        ChoiceStatus::Selected => "*",
                        ChoiceStatus::Candidate => "",
                    };
                    // Only the first row of each promotion carries its id and contribution
                    let (id, points) = match i {
                        0 => (promotion_id.to_string(), state.contribution.to_string()),
                        _ => (String::new(), String::new()),
                    };
                    table.add_row(row![
                        id,
                        points,
                        marker,
                        update.choice,
                        update.description,
                        side_effect(update.side_effect.as_ref())
                    ]);
                }
                if let Some(demoted) = &state.demoted {
                    table.add_row(row!["", "", "!", demoted, "No longer available for this basket", ""]);
                }
            }
            Err(err) => {
                table.add_row(row![promotion_id, "", "!", UpdateChoice::None, err, ""]);
            }
        }
    }
    table.to_string()
}

pub fn report_summary(report: &CheckoutReport) -> String {
    let stages = report.stages.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(" -> ");
    let mut lines = vec![format!("Outcome: {}", report.outcome), format!("Stages:  {stages}")];
    if report.paid {
        lines.push("The basket has been paid.".into());
    }
    for promotion_id in &report.coerced {
        lines.push(format!("The choice for {promotion_id} is no longer available and was reset to `none`."));
    }
    for warning in &report.warnings {
        lines.push(format!("Warning: {warning}"));
    }
    if report.committed.is_empty() {
        lines.push("No tokens were updated.".into());
    } else {
        lines.push(tokens_table(&report.committed));
    }
    lines.join("\n")
}
