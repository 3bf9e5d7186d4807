//! Built-in task scenarios and todo-file loading.

use std::path::Path;

use anyhow::{Context, bail};

/// A named task ready to hand to the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub default_exp_name: String,
    pub instruction: String,
    pub todos: Vec<String>,
}

pub fn amazon(product_name: &str) -> Scenario {
    Scenario {
        name: "amazon".into(),
        default_exp_name: "amazon_crawl".into(),
        instruction: format!("Find the information about the top-selling {product_name} on Amazon"),
        todos: vec![
            format!(
                "Open a new tab, go to www.amazon.com, and search for {product_name} in the search bar"
            ),
            "Click on 'Sort by' in the top right of the page and select 'Best Sellers'".into(),
        ],
    }
}

#[derive(Debug, Clone)]
pub struct Patient {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// `MM-DD-YYYY`
    pub birthday: String,
    pub zip_code: String,
}

pub fn cvs(patient: &Patient) -> anyhow::Result<Scenario> {
    let parts: Vec<&str> = patient.birthday.split('-').collect();
    let [month, day, year] = parts.as_slice() else {
        bail!("birthday must be MM-DD-YYYY, got '{}'", patient.birthday);
    };
    let Patient {
        first_name,
        last_name,
        email,
        birthday,
        zip_code,
    } = patient;

    Ok(Scenario {
        name: "cvs".into(),
        default_exp_name: "cvs".into(),
        instruction: format!(
            "Schedule an appointment at CVS for {first_name} {last_name} with email {email} and birthday {birthday}"
        ),
        todos: vec![
            "Open a new tab, go to www.cvs.com, type 'flu shot' in the search bar and press enter, wait for the page to load, then click on the button of Schedule vaccinations on the top of the page".into(),
            format!("Enter the first name '{first_name}', last name '{last_name}', and email '{email}' in the form. Do not use any suggested autofills. Make sure the mobile phone number is empty."),
            format!("Slightly scroll down to see the date of birth, enter Month '{month}', Day '{day}', and Year '{year}' in the form"),
            "Click on 'Continue as guest' button, wait for the page to load with wait, click on 'Add vaccines' button, select 'Flu' and click on 'Add vaccines'".into(),
            format!("Click on 'next' to enter the page with recommendation vaccines, then click on 'next' again, until on the page of entering zip code, enter '{zip_code}', select the first option from the dropdown menu, and click on 'Search'"),
        ],
    })
}

pub const NUCLEAR_SIDEBAR: &[&str] = &[
    "Dashboard",
    "Downloads",
    "Lyrics",
    "Plugins",
    "Search Results",
    "Settings",
    "Equalizer",
    "Visualizer",
    "Listening History",
    "Favorite Albums",
    "Favorite Tracks",
    "Favorite Artists",
    "Local Library",
    "Playlists",
];

pub fn nuclear_qa() -> Scenario {
    Scenario {
        name: "nuclear-qa".into(),
        default_exp_name: "nuclear_qa".into(),
        instruction: "QA: click through every sidebar button in the Nuclear Player UI".into(),
        todos: NUCLEAR_SIDEBAR
            .iter()
            .map(|page| format!("Click on '{page}' in the left sidebar"))
            .collect(),
    }
}

/// One todo per non-empty line; lines starting with `#` are comments.
pub fn parse_todos(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn from_file(path: &Path, instruction: Option<String>) -> anyhow::Result<Scenario> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading todos from {}", path.display()))?;
    let todos = parse_todos(&raw);
    if todos.is_empty() {
        bail!("{} contains no todos", path.display());
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "run".to_string());
    Ok(Scenario {
        name: stem.clone(),
        default_exp_name: stem,
        instruction: instruction.unwrap_or_default(),
        todos,
    })
}
