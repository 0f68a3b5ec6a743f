//! Terminal output for generation listings and deletion previews

use crate::types::Generation;
use anyhow::{Context, Result};
use crossterm::style::Stylize;

/// One listing row, without styling
pub fn generation_row(generation: &Generation) -> String {
    let marker = if generation.is_current { "●" } else { " " };
    let mut row = format!(
        "{} #{:<5} {:<19}  {:<24} {:<16} {}",
        marker,
        generation.number,
        generation.formatted_date(),
        generation.display_version(),
        generation.display_kernel(),
        generation.display_description(),
    );
    if !generation.specialisations.is_empty() {
        row.push_str(&format!("  [{}]", generation.specialisations.join(", ")));
    }
    row.trim_end().to_string()
}

fn header() -> String {
    format!(
        "  {:<6} {:<19}  {:<24} {:<16} {}",
        "GEN", "DATE", "NIXOS", "KERNEL", "DESCRIPTION"
    )
}

/// Print the generation table
pub fn print_generations(profile: &str, generations: &[Generation]) {
    if generations.is_empty() {
        println!("{}", format!("No generations found in profile '{}'", profile).dim());
        return;
    }

    println!("{}", header().bold());
    for generation in generations {
        let row = generation_row(generation);
        if generation.is_current {
            println!("{}", row.green().bold());
        } else {
            println!("{}", row);
        }
    }
}

/// Print the generations as a JSON array
pub fn print_generations_json(generations: &[Generation]) -> Result<()> {
    println!("{}", generations_json(generations)?);
    Ok(())
}

fn generations_json(generations: &[Generation]) -> Result<String> {
    serde_json::to_string_pretty(generations).context("Failed to serialize generations")
}

/// Show what a deletion will remove before asking for confirmation
pub fn print_deletion_preview(profile: &str, doomed: &[&Generation], remaining: usize) {
    println!(
        "{}",
        format!(
            "The following generations of profile '{}' will be deleted:",
            profile
        )
        .bold()
    );
    for generation in doomed {
        println!(
            "  {} {}  {}",
            format!("#{:<5}", generation.number).red(),
            generation.formatted_date(),
            generation.display_description()
        );
    }
    println!(
        "{}",
        format!("{} generation(s) will remain.", remaining).dim()
    );
}
