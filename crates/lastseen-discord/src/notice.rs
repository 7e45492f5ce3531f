// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use lastseen_core::Member;
use lastseen_core::time::to_datetime;

/// Plain-text departure notice for the notification channel.
pub fn leave_message(member: &Member) -> String {
    let mut lines = vec![
        "Member left".to_string(),
        format!("Username: {}", member.username),
        format!("Nickname: {}", member.nickname.as_deref().unwrap_or("Not set")),
    ];
    if !member.roles.is_empty() {
        let roles: Vec<&str> = member.roles.iter().map(String::as_str).collect();
        lines.push(format!("Roles: {}", roles.join(", ")));
    }
    if let Some(joined) = member.join_date {
        lines.push(format!(
            "Joined: {}",
            to_datetime(joined).format("%Y-%m-%d %H:%M UTC")
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lastseen_core::{LastSeen, MemberRoles, NicknameHistory};

    fn member() -> Member {
        Member {
            guild_id: 1,
            user_id: 2,
            username: "wanderer".into(),
            nickname: None,
            nickname_history: NicknameHistory::new(),
            join_date: None,
            join_position: None,
            last_seen: LastSeen::NeverSeen,
            is_active: false,
            left_date: Some(1_772_638_930),
            roles: MemberRoles::new(),
        }
    }

    #[test]
    fn minimal_notice() {
        assert_eq!(
            leave_message(&member()),
            "Member left\nUsername: wanderer\nNickname: Not set"
        );
    }

    #[test]
    fn notice_lists_roles_and_join_date() {
        let m = Member {
            nickname: Some("Wandy".into()),
            join_date: Some(1_772_638_930),
            roles: ["Member".to_string(), "Artist".to_string()].into_iter().collect(),
            ..member()
        };
        let text = leave_message(&m);
        assert!(text.contains("Nickname: Wandy"));
        assert!(text.contains("Roles: Member, Artist"));
        assert!(text.ends_with("Joined: 2026-03-04 15:42 UTC"));
    }
}
