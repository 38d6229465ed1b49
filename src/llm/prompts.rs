use crate::sheet::{render_rows, RawRow};
use crate::taxonomy::Taxonomy;

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"
You are a Balance Sheet Normalization Specialist.

## YOUR MISSION
You receive the raw cell grid of one balance sheet spreadsheet together with a
closed list of standardized position codes. Map every balance sheet line item
you can identify onto exactly one of those codes.

## DOCUMENT CONTEXT
The sheet layout is unknown and report-specific. Labels may use different
wordings, values may sit in unusual columns, and hierarchy may be expressed
through indentation (leading empty cells) or blank separator rows. Adapt to
these variations; the row grid preserves the original layout for that reason.

## CRITICAL RULES

### 1. Closed Code Set
- Use ONLY codes from the STANDARDIZED POSITIONS list, copied verbatim.
- NEVER invent, rename, or abbreviate a code. A label that fits no code goes
  into `excluded`, not into `positions`.
- Emit at most ONE claim per code. If several rows map to the same code, pick
  the leaf row that directly carries the value.

### 2. Periods
- The most recent period present in the sheet is the "current" period.
- The period immediately preceding it is the "previous" period.
- Ignore any older periods beyond those two.

### 3. Values
- Copy numbers as they appear. Do NOT sum, derive, or guess values.
- When the sheet shows no value for a period, use null. Absence of data is
  null, never a fabricated number.

### 4. Excluded Channel (mandatory)
For EVERY candidate label you considered but rejected, add an entry to
`excluded` with the original label and a short reason. This includes:
- Section headers and subtotals ("Current Assets", "Total Liabilities")
- Calculated lines ("Net Income", "Working Capital")
- Rows that are not balance sheet positions (notes, dates, signatures)
- Labels you could not confidently map to any standardized code

## OUTPUT FORMAT
Return ONLY valid JSON matching the provided schema: an object with a
`positions` array and an `excluded` array. Both arrays are required; use an
empty array rather than omitting one.
"#;

/// Render the user-facing half of the extraction request: the taxonomy
/// listing in stable code order, then the layout-preserving sheet grid.
pub fn build_extraction_request(rows: &[RawRow], taxonomy: &Taxonomy) -> String {
    let mut request = String::from("### STANDARDIZED POSITIONS\n");
    for position in taxonomy.iter() {
        request.push_str(&format!(
            "- {} — {} [{}]\n",
            position.code, position.description, position.category
        ));
    }

    request.push_str("\n### SHEET ROWS (first sheet, original layout)\n");
    request.push_str(&render_rows(rows));
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::CellValue;
    use crate::taxonomy::{PositionCategory, PositionType};

    #[test]
    fn test_request_lists_taxonomy_in_code_order() {
        let taxonomy = Taxonomy::from_entries(vec![
            PositionType::new("inventory", "Inventory", PositionCategory::Asset),
            PositionType::new("accounts_payable", "Payables", PositionCategory::Liability),
        ]);
        let rows = vec![RawRow {
            index: 0,
            cells: vec![CellValue::Text("Cash".to_string()), CellValue::Number(10.0)],
        }];

        let request = build_extraction_request(&rows, &taxonomy);
        let payables_at = request.find("accounts_payable").unwrap();
        let inventory_at = request.find("inventory").unwrap();
        assert!(payables_at < inventory_at);
        assert!(request.contains("[liability]"));
        assert!(request.contains("1 | Cash | 10"));
    }
}
