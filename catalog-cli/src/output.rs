use std::collections::BTreeMap;

use channel_catalog::{ChannelRecord, ReferenceEntry};
use colored::*;

pub fn print_catalog(channels: &[ChannelRecord]) {
    println!("{}", format!("{} channels", channels.len()).green().bold());
    for channel in channels {
        let quality = if channel.is_hd { "HD" } else { "SD" };
        let line = format!(
            "{:>4}  {:<8} {:<40} {}",
            channel.number, channel.id, channel.name, quality
        );
        if channel.is_playable() {
            println!("{line}");
        } else {
            println!("{} {}", line.dimmed(), "(unreachable)".yellow());
        }
    }
}

pub fn print_references(entries: &[ReferenceEntry]) {
    let mut zones: BTreeMap<(&str, &str), Vec<&ReferenceEntry>> = BTreeMap::new();
    for entry in entries {
        zones
            .entry((entry.plugin.as_str(), entry.zone.as_str()))
            .or_default()
            .push(entry);
    }
    for ((plugin, zone), entries) in zones {
        println!("{} {}", zone.cyan().bold(), format!("({plugin})").dimmed());
        for entry in entries {
            println!("  {:<24} {}", entry.id, entry.name);
        }
    }
}
