//! Rate sheet fixtures built in memory as CSV
#![allow(dead_code)]

/// Service codes in sheet column order.
pub const SERVICES: [&str; 8] = ["ECO", "REG", "ONS", "SDS", "TRC", "T15", "T25", "T60"];

/// The four title/header rows every rate sheet starts with.
pub fn header_lines() -> Vec<String> {
    let mut groups = vec!["Destination".to_string(), String::new(), String::new()];
    let mut columns = vec![
        "Province".to_string(),
        "City".to_string(),
        "District".to_string(),
    ];
    for service in SERVICES {
        groups.extend([service.to_string(), String::new()]);
        columns.extend(["Rate".to_string(), "SLA".to_string()]);
    }

    vec![
        "Courier Rate Sheet".to_string(),
        "Effective 2026-01-01".to_string(),
        groups.join(","),
        columns.join(","),
    ]
}

/// A data row with `(service, rate, sla)` entries; other groups are left empty.
pub fn data_row(destination: [&str; 3], entries: &[(&str, &str, &str)]) -> String {
    let mut cells: Vec<String> = destination.iter().map(|s| s.to_string()).collect();
    cells.resize(3 + SERVICES.len() * 2, String::new());

    for (service, rate, sla) in entries {
        let position = SERVICES
            .iter()
            .position(|s| s == service)
            .unwrap_or_else(|| panic!("unknown service {}", service));
        cells[3 + position * 2] = rate.to_string();
        cells[4 + position * 2] = sla.to_string();
    }

    cells.join(",")
}

/// Blank row as spreadsheet exports write it, delimiters only.
pub fn blank_row() -> String {
    ",,".to_string()
}

pub fn csv_sheet(rows: &[String]) -> Vec<u8> {
    let mut lines = header_lines();
    lines.extend(rows.iter().cloned());
    lines.join("\n").into_bytes()
}

/// One valid row, one blank row, one row with an invalid REG rate.
pub fn mixed_sheet() -> Vec<u8> {
    csv_sheet(&[
        data_row(["Jawa Barat", "Bandung", "Coblong"], &[("ECO", "25000", "2-3 hari")]),
        blank_row(),
        data_row(["Jawa Barat", "Bandung", "Sukajadi"], &[("REG", "-abc", "1-2 hari")]),
    ])
}

/// `rows` valid destinations with ECO and REG rates each.
pub fn bulk_sheet(rows: usize) -> Vec<u8> {
    let data: Vec<String> = (0..rows)
        .map(|i| {
            let district = format!("District {}", i + 1);
            let eco = (10_000 + i * 100).to_string();
            data_row(
                ["Jawa Timur", "Surabaya", district.as_str()],
                &[("ECO", eco.as_str(), "3-4 hari"), ("REG", "N/A", "-")],
            )
        })
        .collect();
    csv_sheet(&data)
}

/// Fewer columns than a full sheet.
pub fn narrow_sheet() -> Vec<u8> {
    b"Courier Rate Sheet\nEffective 2026-01-01\nDestination,,,ECO,\nProvince,City,District,Rate,SLA\nBali,Denpasar,Kuta,18000,2 hari\n"
        .to_vec()
}
