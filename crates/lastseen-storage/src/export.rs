// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Member list export as CSV or aligned plain text.

use std::io::Write;

use lastseen_core::time::to_datetime;
use lastseen_core::{LastSeen, LastSeenError, Member};

const HEADERS: [&str; 9] = [
    "user_id",
    "username",
    "nickname",
    "status",
    "join_date",
    "join_position",
    "last_seen",
    "left_date",
    "roles",
];

fn format_ts(ts: Option<i64>) -> String {
    ts.map(|ts| to_datetime(ts).format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_default()
}

fn last_seen_label(state: LastSeen) -> String {
    match state {
        LastSeen::NeverSeen => "never".to_string(),
        LastSeen::OnlineNow => "online".to_string(),
        LastSeen::OfflineSince(ts) => format_ts(Some(ts)),
    }
}

fn record(member: &Member) -> [String; 9] {
    [
        member.user_id.to_string(),
        member.username.clone(),
        member.nickname.clone().unwrap_or_default(),
        if member.is_active { "active" } else { "left" }.to_string(),
        format_ts(member.join_date),
        member
            .join_position
            .map(|p| p.to_string())
            .unwrap_or_default(),
        last_seen_label(member.last_seen),
        format_ts(member.left_date),
        member.roles.iter().map(String::as_str).collect::<Vec<_>>().join("; "),
    ]
}

/// Write members as CSV with a header row.
pub fn write_csv<W: Write>(members: &[Member], out: W) -> Result<(), LastSeenError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(HEADERS).map_err(LastSeenError::storage)?;
    for member in members {
        writer
            .write_record(record(member))
            .map_err(LastSeenError::storage)?;
    }
    writer.flush().map_err(LastSeenError::storage)
}

/// Render members as CSV text.
pub fn members_to_csv(members: &[Member]) -> Result<String, LastSeenError> {
    let mut buf = Vec::new();
    write_csv(members, &mut buf)?;
    String::from_utf8(buf).map_err(LastSeenError::storage)
}

/// Render members as a column-aligned text table.
pub fn members_to_txt(members: &[Member]) -> String {
    let rows: Vec<[String; 9]> = members.iter().map(record).collect();
    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, HEADERS, &widths);
    push_line(&mut out, widths.map(|w| "-".repeat(w)), &widths);
    for row in &rows {
        push_line(&mut out, row, &widths);
    }
    out
}

fn push_line<I>(out: &mut String, cells: I, widths: &[usize])
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let line = cells
        .into_iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell.as_ref(), width = *width))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use lastseen_core::{MemberRoles, NicknameHistory};

    fn member(user_id: i64, username: &str, nickname: Option<&str>) -> Member {
        Member {
            guild_id: 1,
            user_id,
            username: username.to_string(),
            nickname: nickname.map(str::to_string),
            nickname_history: NicknameHistory::default(),
            join_date: Some(1_772_582_400),
            join_position: Some(user_id),
            last_seen: LastSeen::OnlineNow,
            is_active: true,
            left_date: None,
            roles: ["Member", "Mod"].into_iter().map(String::from).collect::<MemberRoles>(),
        }
    }

    #[test]
    fn csv_quotes_fields_with_commas() {
        let members = vec![member(7, "alice", Some("Ali, the Great"))];
        let csv = members_to_csv(&members).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "user_id,username,nickname,status,join_date,join_position,last_seen,left_date,roles"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("7,alice,\"Ali, the Great\",active,2026-03-04 00:00 UTC,7,online,,"));
        assert!(row.ends_with("Member; Mod"));
    }

    #[test]
    fn txt_aligns_columns() {
        let mut gone = member(12345, "bob", None);
        gone.is_active = false;
        gone.last_seen = LastSeen::NeverSeen;
        let txt = members_to_txt(&[member(1, "alice", None), gone]);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("-------"));
        let status_col = lines[0].find("status").unwrap();
        assert_eq!(&lines[2][status_col..status_col + 6], "active");
        assert_eq!(&lines[3][status_col..status_col + 4], "left");
        assert!(lines[3].contains("never"));
    }

    #[test]
    fn empty_export_has_header_only() {
        assert_eq!(members_to_csv(&[]).unwrap().lines().count(), 1);
        assert_eq!(members_to_txt(&[]).lines().count(), 2);
    }
}
