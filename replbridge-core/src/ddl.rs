//! The DDL translator: a pure function from a source-dialect command
//! string to a target-dialect command string, or `None` when the shape
//! is not representable and should be silently skipped upstream.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// The two DDL operations the schema-change event can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlOperation {
    AlterTable,
    DropTable,
}

impl DdlOperation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DDL_ALTER_TABLE" => Some(Self::AlterTable),
            "DDL_DROP_TABLE" => Some(Self::DropTable),
            _ => None,
        }
    }
}

struct TypeRewrite {
    pattern: Regex,
    replacement: &'static str,
}

fn ci(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("static regex is valid")
}

static TYPE_REWRITES: Lazy<Vec<TypeRewrite>> = Lazy::new(|| {
    vec![
        TypeRewrite {
            pattern: ci(r"\bNVARCHAR\s*\(\s*MAX\s*\)"),
            replacement: "TEXT",
        },
        TypeRewrite {
            pattern: ci(r"\bNVARCHAR\s*\(\s*(\d+)\s*\)"),
            replacement: "VARCHAR($1)",
        },
        TypeRewrite {
            pattern: ci(r"\bNTEXT\b"),
            replacement: "TEXT",
        },
        TypeRewrite {
            pattern: ci(r"\bBIT\b"),
            replacement: "BOOLEAN",
        },
        TypeRewrite {
            pattern: ci(r"\bDATETIME2\b"),
            replacement: "DATETIME",
        },
        TypeRewrite {
            pattern: ci(r"\bUNIQUEIDENTIFIER\b"),
            replacement: "VARCHAR(36)",
        },
        TypeRewrite {
            pattern: ci(r"\bINT\s+IDENTITY\s*\(\s*1\s*,\s*1\s*\)"),
            replacement: "INT AUTO_INCREMENT",
        },
        TypeRewrite {
            pattern: ci(r"\bBIGINT\s+IDENTITY\s*\(\s*1\s*,\s*1\s*\)"),
            replacement: "BIGINT AUTO_INCREMENT",
        },
        TypeRewrite {
            pattern: ci(r"\bGETDATE\s*\(\s*\)"),
            replacement: "NOW()",
        },
        TypeRewrite {
            pattern: ci(r"\bNEWID\s*\(\s*\)"),
            replacement: "UUID()",
        },
    ]
});

static SCHEMA_PREFIX: Lazy<Regex> = Lazy::new(|| ci(r"\[dbo\]\."));
static BRACKETED_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]").unwrap());
static LOCK_ESCALATION: Lazy<Regex> = Lazy::new(|| ci(r"\bSET\s*\(\s*LOCK_ESCALATION\s*="));
static ALTER_COLUMN: Lazy<Regex> = Lazy::new(|| ci(r"\bALTER\s+COLUMN\b"));
static DROP_BARE: Lazy<Regex> = Lazy::new(|| ci(r"^\s*DROP\s+\[([^\]]+)\]\s*$"));
static DROP_COLUMN: Lazy<Regex> = Lazy::new(|| ci(r"^\s*DROP\s+COLUMN\s+([^\s;]+)\s*$"));

// ADD-column patterns, tried in order, first match wins.
static ADD_WITH_LEN_AND_NULL: Lazy<Regex> = Lazy::new(|| {
    ci(r"^\s*Add\s+\[([^\]]+)\]\s+\[?([A-Za-z0-9_]+)\]?\s*\(\s*(\d+)\s*\)\s*(NULL|NOT\s+NULL)\s*$")
});
static ADD_WITH_LEN: Lazy<Regex> =
    Lazy::new(|| ci(r"^\s*Add\s+\[([^\]]+)\]\s+\[?([A-Za-z0-9_]+)\]?\s*\(\s*(\d+)\s*\)\s*$"));
static ADD_NO_LEN_WITH_NULL: Lazy<Regex> =
    Lazy::new(|| ci(r"^\s*Add\s+\[([^\]]+)\]\s+\[?([A-Za-z0-9_]+)\]?\s*(NULL|NOT\s+NULL)\s*$"));
static ADD_BARE: Lazy<Regex> =
    Lazy::new(|| ci(r"^\s*Add\s+\[([^\]]+)\]\s+\[?([A-Za-z0-9_]+)\]?\s*$"));

/// Translate one DDL command. Returns `None` when the command is not
/// representable in the target dialect (e.g. `SET (LOCK_ESCALATION …)`),
/// meaning it should be reported as a skipped success, not an error.
pub fn translate(command: &str, operation: DdlOperation, _table_name: &str) -> Option<String> {
    if LOCK_ESCALATION.is_match(command) {
        return None;
    }

    match operation {
        DdlOperation::AlterTable => Some(translate_alter_table(command)),
        DdlOperation::DropTable => Some(rewrite_identifiers_and_types(command)),
    }
}

fn translate_alter_table(command: &str) -> String {
    let prefix_stripped = SCHEMA_PREFIX.replace_all(command, "").to_string();

    // Find the fragment after `ALTER TABLE <table>` so the ADD/DROP/ALTER
    // sub-clause can be pattern-matched independently of the table name.
    let (head, tail) = split_after_table_name(&prefix_stripped);

    if let Some(caps) = ADD_WITH_LEN_AND_NULL.captures(tail) {
        return format!(
            "{head} ADD COLUMN `{col}` {ty}({len}) CHARACTER SET utf8mb4 COLLATE utf8mb4_0900_ai_ci {null}",
            head = head,
            col = &caps[1],
            ty = map_data_type(&caps[2]),
            len = &caps[3],
            null = normalize_null(&caps[4]),
        );
    }
    if let Some(caps) = ADD_WITH_LEN.captures(tail) {
        return format!(
            "{head} ADD COLUMN `{col}` {ty}({len}) CHARACTER SET utf8mb4 COLLATE utf8mb4_0900_ai_ci",
            head = head,
            col = &caps[1],
            ty = map_data_type(&caps[2]),
            len = &caps[3],
        );
    }
    if let Some(caps) = ADD_NO_LEN_WITH_NULL.captures(tail) {
        return format!(
            "{head} ADD COLUMN `{col}` {ty} CHARACTER SET utf8mb4 COLLATE utf8mb4_0900_ai_ci {null}",
            head = head,
            col = &caps[1],
            ty = map_data_type(&caps[2]),
            null = normalize_null(&caps[3]),
        );
    }
    if let Some(caps) = ADD_BARE.captures(tail) {
        return format!(
            "{head} ADD COLUMN `{col}` {ty} CHARACTER SET utf8mb4 COLLATE utf8mb4_0900_ai_ci",
            head = head,
            col = &caps[1],
            ty = map_data_type(&caps[2]),
        );
    }
    if let Some(caps) = DROP_COLUMN.captures(tail) {
        return format!("{head} DROP COLUMN `{col}`", head = head, col = &caps[1]);
    }
    if let Some(caps) = DROP_BARE.captures(tail) {
        return format!("{head} DROP COLUMN `{col}`", head = head, col = &caps[1]);
    }
    if ALTER_COLUMN.is_match(tail) {
        let rewritten_tail = ALTER_COLUMN.replace(tail, "MODIFY COLUMN");
        return rewrite_identifiers_and_types(&format!("{head} {rewritten_tail}"));
    }

    // Unknown shape: identifier rewriting only, per the fallback rule.
    rewrite_identifiers_and_types(&prefix_stripped)
}

/// Splits `ALTER TABLE \`Name\` <rest>` into `("ALTER TABLE `Name`", "<rest>")`
/// so clause matching doesn't need to special-case the table identifier.
fn split_after_table_name(command: &str) -> (String, &str) {
    static ALTER_TABLE_HEAD: Lazy<Regex> =
        Lazy::new(|| ci(r"^(\s*ALTER\s+TABLE\s+\[?[A-Za-z0-9_]+\]?)\s*(.*)$"));
    if let Some(caps) = ALTER_TABLE_HEAD.captures(command) {
        let head = BRACKETED_IDENT
            .replace_all(caps.get(1).unwrap().as_str(), "`$1`")
            .trim()
            .to_string();
        let rest_start = caps.get(2).unwrap().start();
        (head, &command[rest_start..])
    } else {
        (command.trim().to_string(), "")
    }
}

fn normalize_null(token: &str) -> &'static str {
    if token.to_ascii_uppercase().contains("NOT") {
        "NOT NULL"
    } else {
        "NULL"
    }
}

fn map_data_type(ty: &str) -> String {
    let mut result = ty.to_string();
    for rewrite in TYPE_REWRITES.iter() {
        result = rewrite
            .pattern
            .replace_all(&result, rewrite.replacement)
            .to_string();
    }
    result
}

/// Apply the common rewrites (schema prefix strip, data-type map,
/// identifier quoting) with no operation-specific clause restructuring.
fn rewrite_identifiers_and_types(command: &str) -> String {
    let no_prefix = SCHEMA_PREFIX.replace_all(command, "");
    let mut result = no_prefix.to_string();
    for rewrite in TYPE_REWRITES.iter() {
        result = rewrite.pattern.replace_all(&result, rewrite.replacement).to_string();
    }
    BRACKETED_IDENT.replace_all(&result, "`$1`").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_column_with_length_and_null() {
        let out = translate(
            "ALTER TABLE [dbo].[Sales] Add [Note] [NVARCHAR](50) NULL",
            DdlOperation::AlterTable,
            "Sales",
        )
        .unwrap();
        assert_eq!(
            out,
            "ALTER TABLE `Sales` ADD COLUMN `Note` VARCHAR(50) CHARACTER SET utf8mb4 COLLATE utf8mb4_0900_ai_ci NULL"
        );
    }

    #[test]
    fn lock_escalation_is_skipped() {
        let out = translate(
            "ALTER TABLE [dbo].[Sales] SET (LOCK_ESCALATION = TABLE)",
            DdlOperation::AlterTable,
            "Sales",
        );
        assert!(out.is_none());
    }

    #[test]
    fn drop_column_bare_form() {
        let out = translate(
            "ALTER TABLE [dbo].[Sales] DROP [Note]",
            DdlOperation::AlterTable,
            "Sales",
        )
        .unwrap();
        assert_eq!(out, "ALTER TABLE `Sales` DROP COLUMN `Note`");
    }

    #[test]
    fn drop_column_explicit_form() {
        let out = translate(
            "ALTER TABLE [dbo].[Sales] DROP COLUMN Note",
            DdlOperation::AlterTable,
            "Sales",
        )
        .unwrap();
        assert_eq!(out, "ALTER TABLE `Sales` DROP COLUMN `Note`");
    }

    #[test]
    fn drop_table_rewrites_identifiers_only() {
        let out = translate(
            "DROP TABLE [dbo].[Sales]",
            DdlOperation::DropTable,
            "Sales",
        )
        .unwrap();
        assert_eq!(out, "DROP TABLE `Sales`");
    }

    #[test]
    fn is_pure_function() {
        let cmd = "ALTER TABLE [dbo].[Sales] Add [Note] [NVARCHAR](50) NULL";
        let a = translate(cmd, DdlOperation::AlterTable, "Sales");
        let b = translate(cmd, DdlOperation::AlterTable, "Sales");
        assert_eq!(a, b);
    }
}
