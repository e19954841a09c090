//! The `fitscore init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_once(Path::new("fitscore.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("rules")?;
    write_once(Path::new("rules/example.toml"), EXAMPLE_RULES)?;

    write_once(Path::new("dataset.json"), EXAMPLE_DATASET)?;

    println!("\nNext steps:");
    println!("  1. Edit rules/example.toml with your school's standards");
    println!("  2. Run: fitscore validate");
    println!("  3. Run: fitscore evaluate --year 2024 --save");
    println!("  4. Run: fitscore rank --year 2024 && fitscore stats --year 2024");

    Ok(())
}

fn write_once(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# fitscore configuration

rules_path = "rules"
dataset_path = "dataset.json"
output_dir = "./fitscore-reports"
parallelism = 4
strict_rules = false

# Composite weights. Leave the table empty to use a plain sum of item scores.
[weights]
bmi = 0.15
vital_capacity = 0.15
sprint_50m = 0.20
sit_and_reach = 0.10
standing_long_jump = 0.10
sit_ups = 0.10
pull_ups = 0.10
endurance_run = 0.20
"#;

const EXAMPLE_RULES: &str = r#"[catalog]
year = 2024

[[rules]]
id = 1
grades = [7, 9]
gender = "male"
item = "sprint_50m"
excellent = 7.1
good = 7.8
pass = 9.1

[[rules]]
id = 2
grades = [7, 9]
gender = "female"
item = "sprint_50m"
excellent = 7.8
good = 8.6
pass = 10.1

[[rules]]
id = 3
grades = [7, 9]
gender = "male"
item = "standing_long_jump"
excellent = 225
good = 205
pass = 170

[[rules]]
id = 4
grades = [7, 9]
gender = "female"
item = "standing_long_jump"
excellent = 190
good = 170
pass = 140

[[rules]]
id = 5
grades = [7, 9]
gender = "male"
item = "pull_ups"
excellent = 12
good = 9
pass = 4

[[rules]]
id = 6
grades = [7, 9]
gender = "female"
item = "sit_ups"
excellent = 48
good = 40
pass = 26
"#;

const EXAMPLE_DATASET: &str = r#"{
  "classes": [
    { "id": 1, "grade_id": 7, "name": "7A", "students": [101, 102] },
    { "id": 2, "grade_id": 7, "name": "7B", "students": [103, 104] }
  ],
  "records": [
    { "id": 1, "student_id": 101, "year": 2024, "gender": "male", "class_id": 1, "grade_id": 7,
      "measurements": { "sprint_50m": 7.4, "standing_long_jump": 212, "pull_ups": 10 } },
    { "id": 2, "student_id": 102, "year": 2024, "gender": "female", "class_id": 1, "grade_id": 7,
      "measurements": { "sprint_50m": 8.9, "standing_long_jump": 165, "sit_ups": 38 } },
    { "id": 3, "student_id": 103, "year": 2024, "gender": "male", "class_id": 2, "grade_id": 7,
      "measurements": { "sprint_50m": 9.6, "standing_long_jump": 160, "pull_ups": 2 } },
    { "id": 4, "student_id": 104, "year": 2024, "gender": "female", "class_id": 2, "grade_id": 7,
      "measurements": { "sprint_50m": 7.6, "standing_long_jump": 196, "sit_ups": 50 } }
  ]
}
"#;
