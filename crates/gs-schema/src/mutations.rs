//! Recorded schema mutations.
//!
//! Each unit advances the production schema by one numbered step. Units
//! must be consecutively numbered and must behave well when run multiple
//! times: preconditions go through the inspector, and the minimal set of
//! statements follows. A superseded unit stays registered as a no-op so the
//! driver's next-number probe keeps working.
//!
//! A new mutation that relies on triggers should check whether the trigger
//! set needs regeneration first (`ctx.triggers.ensure_current`), or emulate
//! the trigger behaviour with extra statements restoring consistency.

use crate::error::{SchemaError, SchemaResult};
use crate::registry::{MutationContext, MutationRegistry};
use futures::FutureExt;
use gs_db::Param;

pub(crate) fn register_all(registry: &mut MutationRegistry) {
    registry.register(100, "widen log dates to DATETIME to enable time logging", |ctx| {
        widen_log_dates(ctx).boxed()
    });
    registry.register(101, "add sync timestamps for the listing export interface", |ctx| {
        add_listing_sync_timestamps(ctx).boxed()
    });
    registry.register(102, "remove invisible caches from users' hidden statistics", |ctx| {
        rebuild_hidden_counts(ctx).boxed()
    });
    registry.register(103, "update comments on static reference tables", |ctx| {
        mark_static_tables(ctx).boxed()
    });
    registry.register(104, "add maintenance log counters and team comments", |ctx| {
        add_maintenance_counters(ctx).boxed()
    });
    registry.register(105, "move profile texts from user options to the user table", |ctx| {
        move_profile_descriptions(ctx).boxed()
    });
    registry.register(106, "record cache status changes", |ctx| {
        record_status_changes(ctx).boxed()
    });
    registry.register(107, "sync table definitions between developer and production", |ctx| {
        sync_dev_prod_definitions(ctx).boxed()
    });
    registry.register(108, "automatic email-bounce processing", |ctx| {
        add_email_bounce_tracking(ctx).boxed()
    });
    registry.register(109, "move adoption history to a separate table", |ctx| {
        extract_adoption_history(ctx).boxed()
    });
    registry.register(110, "fix event id of old publishing notifications", |ctx| {
        fix_publish_notification_events(ctx).boxed()
    });
    registry.register(111, "add maintained external waypoints", |ctx| {
        add_maintained_waypoints(ctx).boxed()
    });
    registry.register(112, "preventive initial trigger update", |ctx| {
        install_initial_triggers(ctx).boxed()
    });
    registry.register(113, "introduce the trigger version watermark", |ctx| {
        introduce_trigger_watermark(ctx).boxed()
    });
    registry.register(114, "remove obsolete stored routines", |ctx| {
        refresh_triggers(ctx).boxed()
    });
    registry.register(115, "optimize index for sorting logs", |ctx| {
        optimize_log_sort_index(ctx).boxed()
    });
    registry.register(116, "add user profile flag for native-listing notifications", |ctx| {
        add_native_only_notifications(ctx).boxed()
    });
    registry.register(117, "resize password field for hashed passwords", |ctx| {
        widen_password_hashes(ctx).boxed()
    });
    registry.register(118, "dummy for an obsolete mutation, replaced by #121", |ctx| {
        dummy(ctx).boxed()
    });
    registry.register(119, "remove tables of the old, discarded map code", |ctx| {
        drop_legacy_map_cache(ctx).boxed()
    });
    registry.register(120, "add cache lists and list watches", |ctx| {
        add_cache_lists(ctx).boxed()
    });
    registry.register(121, "import updated region codes and recalculate locations", |ctx| {
        import_region_codes(ctx).boxed()
    });
    registry.register(122, "dummy for an obsolete mutation, replaced by #123", |ctx| {
        dummy(ctx).boxed()
    });
    registry.register(123, "fix cache location triggers", |ctx| {
        refresh_triggers(ctx).boxed()
    });
}

async fn dummy(_ctx: &MutationContext<'_>) -> SchemaResult<()> {
    Ok(())
}

async fn widen_log_dates(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    for table in ["cache_logs", "cache_logs_archived"] {
        if ctx.inspector.column_type(table, "date").await?.as_deref() != Some("DATETIME") {
            ctx.db
                .execute(&format!(
                    "ALTER TABLE `{table}` CHANGE COLUMN `date` `date` DATETIME NOT NULL"
                ))
                .await?;
        }
    }
    Ok(())
}

async fn add_listing_sync_timestamps(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    if !ctx.inspector.column_exists("caches", "meta_last_modified").await? {
        // initialize with '0000-00-00 00:00:00' for existing data, that's ok
        ctx.db
            .execute(
                "ALTER TABLE `caches` \
                 ADD COLUMN `meta_last_modified` DATETIME NOT NULL COMMENT 'via trigger (cache_logs)' \
                 AFTER `listing_last_modified`",
            )
            .await?;
    }

    for table in ["cache_logs", "cache_logs_archived"] {
        if ctx.inspector.column_exists(table, "log_last_modified").await? {
            continue;
        }
        let after = if ctx.inspector.column_exists(table, "api_syncbase").await? {
            "api_syncbase"
        } else {
            "last_modified"
        };
        ctx.db
            .execute(&format!(
                "ALTER TABLE `{table}` \
                 ADD COLUMN `log_last_modified` DATETIME NOT NULL AFTER `{after}`"
            ))
            .await?;
        if table == "cache_logs" {
            ctx.db
                .execute(
                    "UPDATE `cache_logs` \
                     SET `log_last_modified` = GREATEST( \
                        `last_modified`, \
                        IFNULL((SELECT MAX(`last_modified`) FROM `pictures` \
                                WHERE `pictures`.`object_type` = 1 \
                                AND `pictures`.`object_id` = `cache_logs`.`id`), '0') \
                     )",
                )
                .await?;
        } else {
            ctx.db
                .execute(&format!(
                    "UPDATE `{table}` SET `log_last_modified` = `last_modified`"
                ))
                .await?;
        }
    }
    Ok(())
}

async fn rebuild_hidden_counts(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    ctx.db
        .execute(
            "INSERT IGNORE INTO `stat_users` (`user_id`) \
             SELECT `user_id` FROM `caches` GROUP BY `user_id`",
        )
        .await?;
    ctx.db
        .execute(
            "UPDATE `stat_users`, \
                (SELECT `user_id`, COUNT(*) AS `count` \
                 FROM `caches` \
                 INNER JOIN `cache_status` \
                    ON `cache_status`.`id` = `caches`.`status` \
                    AND `allow_user_view` = 1 \
                 GROUP BY `user_id`) AS `visible_hidden` \
             SET `stat_users`.`hidden` = `visible_hidden`.`count` \
             WHERE `stat_users`.`user_id` = `visible_hidden`.`user_id`",
        )
        .await?;
    ctx.db.execute("CALL sp_rebuild_stat_summaries()").await?;
    Ok(())
}

async fn mark_static_tables(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    let comments = [
        ("region_codes", "static content"),
        ("region_layers", "static content"),
        ("protected_areas", "static content"),
        ("towns", "static content"),
    ];
    for (table, comment) in comments {
        if ctx.inspector.table_exists(table).await? {
            ctx.db
                .execute(&format!("ALTER TABLE `{table}` COMMENT = '{comment}'"))
                .await?;
        }
    }
    Ok(())
}

async fn add_maintenance_counters(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    for table in ["stat_caches", "stat_cache_logs", "stat_users"] {
        if !ctx.inspector.column_exists(table, "maintenance").await? {
            ctx.db
                .execute(&format!(
                    "ALTER TABLE `{table}` \
                     ADD COLUMN `maintenance` SMALLINT(5) UNSIGNED NOT NULL AFTER `will_attend`"
                ))
                .await?;
        }
    }
    for table in ["cache_logs", "cache_logs_archived"] {
        if !ctx.inspector.column_exists(table, "team_comment").await? {
            ctx.db
                .execute(&format!(
                    "ALTER TABLE `{table}` \
                     ADD COLUMN `team_comment` TINYINT(1) NOT NULL DEFAULT '0' AFTER `type`"
                ))
                .await?;
        }
    }
    // The new fields need no initialization; all values start at zero.
    Ok(())
}

async fn move_profile_descriptions(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    if ctx.inspector.column_exists("users", "profile_description").await? {
        return Ok(());
    }
    ctx.db
        .execute(
            "ALTER TABLE `users` \
             ADD COLUMN `profile_description` MEDIUMTEXT NOT NULL AFTER `data_license`",
        )
        .await?;

    let rows = ctx
        .db
        .query_rows(
            "SELECT CAST(`user_id` AS CHAR), `option_value` \
             FROM `user_options` WHERE `option_id` = ?",
            &[Param::Int(PROFILE_TEXT_OPTION)],
        )
        .await?;
    for row in rows {
        let (Some(Some(user_id)), Some(Some(text))) = (row.first(), row.get(1)) else {
            continue;
        };
        ctx.db
            .execute_with(
                "UPDATE `users` SET `profile_description` = ? WHERE `user_id` = ?",
                &[
                    Param::from(escape_profile_text(text)),
                    Param::from(user_id.as_str()),
                ],
            )
            .await?;
    }
    // The old rows stay in user_options in case something went wrong here.
    Ok(())
}

const PROFILE_TEXT_OPTION: i64 = 3;

async fn record_status_changes(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    if !ctx.inspector.table_exists("cache_status_changes").await? {
        ctx.db
            .execute(
                "CREATE TABLE `cache_status_changes` ( \
                    `cache_id` INT(10) UNSIGNED NOT NULL, \
                    `date_modified` DATETIME NOT NULL, \
                    `old_state` TINYINT(2) UNSIGNED NOT NULL, \
                    `new_state` TINYINT(2) UNSIGNED NOT NULL, \
                    `user_id` INT(10) UNSIGNED NOT NULL DEFAULT '0', \
                    UNIQUE KEY `cache_id` (`cache_id`,`date_modified`) \
                 ) ENGINE=MyISAM",
            )
            .await?;
    }
    Ok(())
}

async fn sync_dev_prod_definitions(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    ctx.db
        .execute(
            "ALTER TABLE `caches` \
             MODIFY `meta_last_modified` DATETIME NOT NULL COMMENT 'via trigger (stat_caches)'",
        )
        .await?;
    if !ctx.inspector.index_exists("cache_reports", "user_id").await? {
        ctx.db
            .execute("ALTER TABLE `cache_reports` ADD INDEX `user_id` (`user_id`)")
            .await?;
    }
    Ok(())
}

async fn add_email_bounce_tracking(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    if !ctx.inspector.column_exists("users", "last_email_problem").await? {
        ctx.db
            .execute(
                "ALTER TABLE `users` \
                 ADD COLUMN `last_email_problem` DATETIME DEFAULT NULL AFTER `email_problems`",
            )
            .await?;
    }
    if !ctx.inspector.column_exists("users", "mailing_problems").await? {
        ctx.db
            .execute(
                "ALTER TABLE `users` \
                 ADD COLUMN `mailing_problems` INT(10) UNSIGNED NOT NULL DEFAULT '0' \
                 AFTER `last_email_problem`",
            )
            .await?;
    }
    Ok(())
}

async fn extract_adoption_history(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    if ctx.inspector.table_exists("cache_adoptions").await? {
        return Ok(());
    }
    ctx.db
        .execute(
            "CREATE TABLE `cache_adoptions` ( \
                `id` INT(10) UNSIGNED NOT NULL AUTO_INCREMENT, \
                `cache_id` INT(10) UNSIGNED NOT NULL, \
                `date` DATETIME NOT NULL, \
                `from_user_id` INT(10) UNSIGNED NOT NULL, \
                `to_user_id` INT(10) UNSIGNED NOT NULL, \
                PRIMARY KEY (`id`), \
                KEY `cache_id` (`cache_id`,`date`) \
             ) ENGINE=MyISAM AUTO_INCREMENT=1",
        )
        .await?;

    // Early adoption events were recorded as free-text audit entries under
    // event id 5; notification entries were stored there too, so the module
    // has to be checked as well.
    let rows = ctx
        .db
        .query_rows(
            "SELECT CAST(`id` AS CHAR), CAST(`date_created` AS CHAR), \
                    CAST(`object_id` AS CHAR), `message` \
             FROM `log_entries` \
             WHERE `event_id` = ? AND `module` = ? \
             ORDER BY `date_created`, `id`",
            &[Param::Int(ADOPTION_EVENT), Param::from("cache")],
        )
        .await?;

    for row in rows {
        let record = row
            .first()
            .cloned()
            .flatten()
            .unwrap_or_else(|| "?".to_string());
        let message = row.get(3).cloned().flatten().unwrap_or_default();
        let Some((from_user, to_user)) = parse_adoption_message(&message) else {
            ctx.db.execute("DROP TABLE `cache_adoptions`").await?;
            return Err(SchemaError::BackfillDataMismatch {
                table: "log_entries".to_string(),
                record,
                message: format!("unknown adoption entry format: {message:?}"),
            });
        };
        let date = row.get(1).cloned().flatten().unwrap_or_default();
        let cache_id = row.get(2).cloned().flatten().unwrap_or_default();
        ctx.db
            .execute_with(
                "INSERT INTO `cache_adoptions` \
                 (`cache_id`, `date`, `from_user_id`, `to_user_id`) \
                 VALUES (?, ?, ?, ?)",
                &[
                    Param::from(cache_id),
                    Param::from(date),
                    Param::Int(from_user),
                    Param::Int(to_user),
                ],
            )
            .await?;
    }
    // The old audit entries stay in log_entries in case something went
    // wrong here.
    Ok(())
}

const ADOPTION_EVENT: i64 = 5;

async fn fix_publish_notification_events(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    ctx.db
        .execute_with(
            "UPDATE `log_entries` SET `event_id` = 8 \
             WHERE `event_id` = ? AND `module` = ?",
            &[Param::Int(ADOPTION_EVENT), Param::from("notify_newcache")],
        )
        .await?;
    Ok(())
}

async fn add_maintained_waypoints(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    if !ctx.inspector.column_exists("caches", "wp_ext_maintained").await? {
        ctx.db
            .execute(
                "ALTER TABLE `caches` \
                 ADD COLUMN `wp_ext_maintained` VARCHAR(7) NOT NULL AFTER `wp_ext`",
            )
            .await?;
        ctx.db
            .execute(
                "UPDATE `caches` SET `wp_ext_maintained` = UCASE(TRIM(`wp_ext`)) \
                 WHERE SUBSTR(TRIM(`wp_ext`), 1, 2) = 'GC'",
            )
            .await?;
    }
    if !ctx.inspector.index_exists("caches", "wp_ext_maintained").await? {
        ctx.db
            .execute("ALTER TABLE `caches` ADD INDEX `wp_ext_maintained` (`wp_ext_maintained`)")
            .await?;
    }
    Ok(())
}

async fn install_initial_triggers(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    // The guard ensures we will not downgrade to an old trigger set if this
    // unit is re-run by accident. Later trigger updates are protected by the
    // watermark returned by schema_trigger_version().
    if !ctx
        .inspector
        .function_exists(crate::triggers::TRIGGER_VERSION_FUNCTION)
        .await?
    {
        ctx.triggers.ensure_current(ctx.version).await?;
    }
    Ok(())
}

async fn introduce_trigger_watermark(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    // schema_trigger_version() was introduced after #112 was already
    // deployed, so installations that updated early need it installed here.
    ctx.triggers.ensure_current(ctx.version).await
}

async fn refresh_triggers(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    ctx.triggers.ensure_current(ctx.version).await
}

async fn optimize_log_sort_index(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    ctx.db
        .execute(
            "ALTER TABLE `cache_logs` \
             DROP INDEX `date`, \
             ADD INDEX `date` (`cache_id`,`date`,`date_created`)",
        )
        .await?;
    Ok(())
}

async fn add_native_only_notifications(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    if !ctx.inspector.column_exists("users", "notify_native_only").await? {
        ctx.db
            .execute(
                "ALTER TABLE `users` \
                 ADD COLUMN `notify_native_only` TINYINT(1) NOT NULL DEFAULT '1' \
                 AFTER `notify_radius`",
            )
            .await?;
        // default-enabled for new users but default-disabled for old users
        ctx.db
            .execute("UPDATE `users` SET `notify_native_only` = 0")
            .await?;
    }
    Ok(())
}

async fn widen_password_hashes(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    ctx.db
        .execute("ALTER TABLE `users` MODIFY COLUMN `password` VARCHAR(128) DEFAULT NULL")
        .await?;
    Ok(())
}

async fn drop_legacy_map_cache(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    ctx.db.execute("DROP TABLE IF EXISTS `map_result`").await?;
    ctx.db
        .execute("DROP TABLE IF EXISTS `map_result_rows`")
        .await?;
    Ok(())
}

async fn add_cache_lists(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    if !ctx.inspector.table_exists("cache_lists").await? {
        ctx.db
            .execute(
                "CREATE TABLE `cache_lists` ( \
                    `id` INT(10) NOT NULL AUTO_INCREMENT, \
                    `uuid` VARCHAR(36) NOT NULL, \
                    `node` TINYINT(3) UNSIGNED NOT NULL DEFAULT '0', \
                    `user_id` INT(10) NOT NULL, \
                    `date_created` DATETIME NOT NULL, \
                    `last_modified` DATETIME NOT NULL, \
                    `name` VARCHAR(80) NOT NULL, \
                    `is_public` TINYINT(1) NOT NULL DEFAULT '0', \
                    PRIMARY KEY (`id`), \
                    UNIQUE KEY `uuid` (`uuid`), \
                    KEY `name` (`name`), \
                    KEY `user_id` (`user_id`) \
                 ) ENGINE=MyISAM",
            )
            .await?;
    }
    if !ctx.inspector.table_exists("cache_list_items").await? {
        ctx.db
            .execute(
                "CREATE TABLE `cache_list_items` ( \
                    `cache_list_id` INT(10) NOT NULL, \
                    `cache_id` INT(10) NOT NULL, \
                    UNIQUE KEY `cache_list_id` (`cache_list_id`,`cache_id`), \
                    KEY `cache_id` (`cache_id`) \
                 ) ENGINE=MyISAM",
            )
            .await?;
    }
    if !ctx.inspector.table_exists("cache_list_watches").await? {
        ctx.db
            .execute(
                "CREATE TABLE `cache_list_watches` ( \
                    `cache_list_id` INT(10) NOT NULL, \
                    `user_id` INT(10) NOT NULL, \
                    UNIQUE KEY `cache_list_id` (`cache_list_id`,`user_id`), \
                    KEY `user_id` (`user_id`) \
                 ) ENGINE=MyISAM",
            )
            .await?;
    }

    if !ctx.inspector.column_exists("caches", "show_in_lists").await? {
        ctx.db
            .execute("ALTER TABLE `caches` ADD COLUMN `show_in_lists` TINYINT(1) NOT NULL DEFAULT '1'")
            .await?;
    }
    // obsolete pre-v3 field
    if ctx.inspector.column_exists("cache_watches", "last_poll").await? {
        ctx.db
            .execute("ALTER TABLE `cache_watches` DROP COLUMN `last_poll`")
            .await?;
    }

    // Lists created before nodes were recorded belong to this installation.
    ctx.db
        .execute_with(
            "UPDATE `cache_lists` SET `node` = ? WHERE `node` = 0",
            &[Param::Int(i64::from(ctx.config.node_id))],
        )
        .await?;
    Ok(())
}

async fn import_region_codes(ctx: &MutationContext<'_>) -> SchemaResult<()> {
    import_sql_file(ctx, "region_codes.sql").await?;

    // Temporarily outdated triggers would overwrite last_modified here;
    // make sure the current set is installed first.
    ctx.triggers.ensure_current(ctx.version).await?;
    ctx.db
        .execute(
            "UPDATE `cache_locations` \
             SET `last_modified` = '2000-01-01 00:00:00' \
             WHERE `code1` IN ('BG', 'HR', 'RO', 'TR')",
        )
        .await?;
    // Locations will be recalculated by the next cronjob run.
    Ok(())
}

/// Execute a static reference-data file statement by statement.
async fn import_sql_file(ctx: &MutationContext<'_>, file_name: &str) -> SchemaResult<()> {
    let path = ctx.config.static_sql_dir.join(file_name);
    let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
        SchemaError::StaticDataError(format!("cannot read {}: {e}", path.display()))
    })?;
    for statement in split_sql_statements(&contents) {
        ctx.db.execute(&statement).await?;
    }
    Ok(())
}

/// Split a SQL script into single statements on semicolons outside string
/// literals. Line comments (`-- ...`) are dropped.
fn split_sql_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in script.lines() {
        if line.trim_start().starts_with("--") {
            continue;
        }
        let mut in_string = false;
        let mut chars = line.chars();
        while let Some(c) = chars.next() {
            match c {
                '\'' => {
                    in_string = !in_string;
                    current.push(c);
                }
                '\\' if in_string => {
                    current.push(c);
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                ';' if !in_string => {
                    let statement = current.trim().to_string();
                    if !statement.is_empty() {
                        statements.push(statement);
                    }
                    current.clear();
                }
                _ => current.push(c),
            }
        }
        current.push('\n');
    }

    let rest = current.trim().to_string();
    if !rest.is_empty() {
        statements.push(rest);
    }
    statements
}

/// Parse a legacy adoption audit message of the form
/// `cache <id> adopted from user <from> to user <to> by <actor>`.
///
/// Returns the (from, to) user ids, or `None` when the message does not
/// match that shape.
fn parse_adoption_message(message: &str) -> Option<(i64, i64)> {
    let tokens: Vec<&str> = message.split_whitespace().collect();
    match tokens.as_slice() {
        ["cache", _cache, "adopted", "from", "user", from, "to", "user", to, "by", _actor] => {
            Some((from.parse().ok()?, to.parse().ok()?))
        }
        _ => None,
    }
}

/// Convert a plain-text profile into the stored HTML form: special
/// characters escaped, newlines rendered as line breaks.
fn escape_profile_text(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;");
    escaped.replace("\r\n", "\n").replace('\n', "<br />\n")
}

#[cfg(test)]
#[path = "mutations_test.rs"]
mod tests;
