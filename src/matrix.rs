use serde::Serialize;

/// One Ledger row, as read from the attendance table.
#[derive(Debug, Clone)]
pub struct LedgerRow {
    pub roll_number: String,
    pub name: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixRow {
    pub roll_number: i64,
    pub name: String,
    /// "P"/"A" per column, aligned with `MatrixModel::columns`.
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixModel {
    /// Distinct dates observed in the Ledger, ascending. Never a generated
    /// calendar range.
    pub columns: Vec<String>,
    /// Sorted ascending by numeric roll. Non-numeric rolls stay in the
    /// Ledger but are dropped from this view.
    pub rows: Vec<MatrixRow>,
    pub dropped_rolls: Vec<String>,
}

/// Pure projection of Ledger rows into the presence matrix. Idempotent:
/// the same rows always produce the same model.
pub fn project(rows: &[LedgerRow]) -> MatrixModel {
    let mut columns: Vec<String> = Vec::new();
    for r in rows {
        if !columns.contains(&r.date) {
            columns.push(r.date.clone());
        }
    }
    columns.sort();

    // (roll, name) keys a matrix row; the name is locked per roll, so a roll
    // can only ever carry one name here.
    let mut keyed: Vec<(i64, String, Vec<bool>)> = Vec::new();
    let mut dropped: Vec<String> = Vec::new();
    for r in rows {
        let Ok(roll) = r.roll_number.trim().parse::<i64>() else {
            if !dropped.contains(&r.roll_number) {
                dropped.push(r.roll_number.clone());
            }
            continue;
        };
        let col = columns
            .iter()
            .position(|d| *d == r.date)
            .unwrap_or_default();
        match keyed.iter_mut().find(|(k, _, _)| *k == roll) {
            Some((_, _, present)) => present[col] = true,
            None => {
                let mut present = vec![false; columns.len()];
                present[col] = true;
                keyed.push((roll, r.name.clone(), present));
            }
        }
    }
    keyed.sort_by_key(|(roll, _, _)| *roll);
    dropped.sort();

    let rows = keyed
        .into_iter()
        .map(|(roll_number, name, present)| MatrixRow {
            roll_number,
            name,
            cells: present
                .into_iter()
                .map(|p| if p { "P" } else { "A" }.to_string())
                .collect(),
        })
        .collect();

    MatrixModel {
        columns,
        rows,
        dropped_rolls: dropped,
    }
}

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Render the matrix as CSV: `roll_number,name,<date...>` then one line per
/// student with P/A cells.
pub fn to_csv(model: &MatrixModel) -> String {
    let mut csv = String::from("roll_number,name");
    for col in &model.columns {
        csv.push(',');
        csv.push_str(&csv_quote(col));
    }
    csv.push('\n');
    for row in &model.rows {
        csv.push_str(&format!("{},{}", row.roll_number, csv_quote(&row.name)));
        for cell in &row.cells {
            csv.push(',');
            csv.push_str(cell);
        }
        csv.push('\n');
    }
    csv
}
