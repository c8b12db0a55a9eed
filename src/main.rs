//! VitalDiet command line front end.
//!
//! ```bash
//! vitaldiet generate <out.jsonl> [--rows N] [--seed S]
//! vitaldiet train <dataset.jsonl> <bundle_dir> [--classifier forest|logistic]
//! vitaldiet predict <bundle_dir> NAME=VALUE... [--threshold T] [--sex male|female] [--rules rules.json] [--json]
//! vitaldiet rules [--rules rules.json]
//! ```

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vitaldiet::adapters::dataset_io::{read_jsonl, write_jsonl};
use vitaldiet::adapters::sanitize::SanitizingMakeWriter;
use vitaldiet::adapters::{FsBundleStore, LogisticRegression, RandomForest};
use vitaldiet::application::synthetic::{generate, SyntheticConfig};
use vitaldiet::domain::{
    DecisionThreshold, DirectiveCategory, FeatureVector, RuleTable, Sex, VitalReadings,
};
use vitaldiet::ports::{BinaryClassifier, BundleStore};
use vitaldiet::{Assessment, DiseasePredictor, ModelBundle, PipelineConfig};

fn usage() -> String {
    "Usage:
  vitaldiet generate <out.jsonl> [--rows N] [--seed S]
  vitaldiet train <dataset.jsonl> <bundle_dir> [--classifier forest|logistic]
  vitaldiet predict <bundle_dir> NAME=VALUE... [--threshold T] [--sex male|female] [--rules rules.json] [--json]
  vitaldiet rules [--rules rules.json]"
        .to_string()
}

enum Command {
    Generate {
        out: PathBuf,
        rows: usize,
        seed: Option<u64>,
    },
    Train {
        dataset: PathBuf,
        bundle_dir: PathBuf,
        classifier: String,
    },
    Predict {
        bundle_dir: PathBuf,
        values: Vec<(String, f64)>,
        threshold: Option<f64>,
        sex: Option<Sex>,
        rules: Option<PathBuf>,
        json: bool,
    },
    Rules {
        rules: Option<PathBuf>,
    },
}

fn parse_args() -> Result<Command> {
    let mut args = env::args().skip(1);
    let command = args.next().ok_or_else(|| anyhow!(usage()))?;

    let mut positional: Vec<String> = Vec::new();
    let mut rows = 5000usize;
    let mut seed = None;
    let mut classifier = "forest".to_string();
    let mut threshold = None;
    let mut sex = None;
    let mut rules = None;
    let mut json = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--rows" => {
                let v = args.next().ok_or_else(|| anyhow!(usage()))?;
                rows = v.trim().parse().context("--rows must be a positive integer")?;
            }
            "--seed" => {
                let v = args.next().ok_or_else(|| anyhow!(usage()))?;
                seed = Some(v.trim().parse().context("--seed must be a u64")?);
            }
            "--classifier" => {
                classifier = args.next().ok_or_else(|| anyhow!(usage()))?;
            }
            "--threshold" => {
                let v = args.next().ok_or_else(|| anyhow!(usage()))?;
                threshold = Some(v.trim().parse().context("--threshold must be a number")?);
            }
            "--sex" => {
                let v = args.next().ok_or_else(|| anyhow!(usage()))?;
                sex = Some(v.parse::<Sex>()?);
            }
            "--rules" => {
                rules = Some(PathBuf::from(args.next().ok_or_else(|| anyhow!(usage()))?));
            }
            "--json" => json = true,
            "-h" | "--help" => bail!(usage()),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let mut next_path = || positional.next().map(PathBuf::from).ok_or_else(|| anyhow!(usage()));

    let parsed = match command.as_str() {
        "generate" => Command::Generate {
            out: next_path()?,
            rows,
            seed,
        },
        "train" => Command::Train {
            dataset: next_path()?,
            bundle_dir: next_path()?,
            classifier,
        },
        "predict" => {
            let bundle_dir = next_path()?;
            let values = positional
                .map(|pair| parse_pair(&pair))
                .collect::<Result<Vec<_>>>()?;
            Command::Predict {
                bundle_dir,
                values,
                threshold,
                sex,
                rules,
                json,
            }
        }
        "rules" => Command::Rules { rules },
        _ => bail!(usage()),
    };
    Ok(parsed)
}

fn parse_pair(pair: &str) -> Result<(String, f64)> {
    let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected NAME=VALUE, got {pair:?}"))?;
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("Value for {name} is not a number"))?;
    Ok((name.trim().to_string(), value))
}

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_mode = env::var("VITALDIET_LOG_MODE").unwrap_or_else(|_| "stderr".to_string());

    let (writer, guard) = match log_mode.as_str() {
        "file" => {
            let log_file = env::var("VITALDIET_LOG_FILE")
                .unwrap_or_else(|_| "vitaldiet.log".to_string());
            if let Some(parent) = Path::new(&log_file).parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .with_context(|| format!("Cannot open log file {log_file}"))?;
            tracing_appender::non_blocking(file)
        }
        "stdout" => tracing_appender::non_blocking(std::io::stdout()),
        _ => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();
    Ok(guard)
}

fn main() -> Result<()> {
    let command = match parse_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let _guard = init_logging()?;
    let config = PipelineConfig::from_env_or_default();

    match command {
        Command::Generate { out, rows, seed } => {
            let synthetic = SyntheticConfig {
                rows,
                seed: seed.unwrap_or(config.seed),
                ..SyntheticConfig::default()
            };
            let dataset = generate(&synthetic)?;
            write_jsonl(&out, &dataset)
                .with_context(|| format!("Cannot write {}", out.display()))?;
            println!("Wrote {} rows to {}", dataset.len(), out.display());
        }
        Command::Train {
            dataset,
            bundle_dir,
            classifier,
        } => {
            let data = read_jsonl(&dataset)
                .with_context(|| format!("Cannot read dataset {}", dataset.display()))?;
            let store = FsBundleStore::new(bundle_dir);
            match classifier.as_str() {
                "forest" => train::<RandomForest>(&config, config.forest.clone(), &data, &store)?,
                "logistic" => {
                    train::<LogisticRegression>(&config, config.logistic.clone(), &data, &store)?;
                }
                other => bail!("Unknown classifier {other:?} (expected forest or logistic)"),
            }
        }
        Command::Predict {
            bundle_dir,
            values,
            threshold,
            sex,
            rules,
            json,
        } => {
            let threshold = match threshold {
                Some(t) => DecisionThreshold::new(t)?,
                None => config.threshold,
            };
            let rules = match rules {
                Some(path) => RuleTable::from_path(&path)
                    .with_context(|| format!("Cannot load rules {}", path.display()))?,
                None => config.load_rules()?,
            };
            let store = FsBundleStore::new(bundle_dir);
            let kind = store.classifier_kind()?;
            let assessment = if kind == RandomForest::KIND {
                assess::<RandomForest>(&store, &values, threshold, sex, &rules)?
            } else if kind == LogisticRegression::KIND {
                assess::<LogisticRegression>(&store, &values, threshold, sex, &rules)?
            } else {
                bail!("Bundle uses unsupported classifier {kind:?}");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&assessment)?);
            } else {
                print_assessment(&assessment);
            }
        }
        Command::Rules { rules } => {
            let table = match rules {
                Some(path) => RuleTable::from_path(&path)
                    .with_context(|| format!("Cannot load rules {}", path.display()))?,
                None => config.load_rules()?,
            };
            println!("{}", serde_json::to_string_pretty(&table)?);
        }
    }

    Ok(())
}

fn train<C: BinaryClassifier>(
    config: &PipelineConfig,
    classifier: C::Config,
    data: &vitaldiet::domain::Dataset,
    store: &FsBundleStore,
) -> Result<()> {
    let (bundle, report) = config.training_service::<C>(classifier).train(data)?;
    store.save(&bundle)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("Top features:");
    for (name, importance) in bundle.metadata().ranked_importances().iter().take(5) {
        println!("  {name:<12} {importance:.4}");
    }
    println!("Saved bundle to {}", store.dir().display());
    Ok(())
}

/// Arrange `values` in the bundle's schema order. Missing names are left out
/// so the predictor reports the schema mismatch. Canonical vitals are
/// screened and reported before prediction.
fn assess<C: BinaryClassifier>(
    store: &FsBundleStore,
    values: &[(String, f64)],
    threshold: DecisionThreshold,
    sex: Option<Sex>,
    rules: &RuleTable,
) -> Result<Assessment> {
    let bundle: ModelBundle<C> = store.load()?;
    if let Some((unknown, _)) = values
        .iter()
        .find(|(name, _)| !bundle.feature_names().contains(name))
    {
        bail!(
            "Unknown feature {unknown:?}; expected {}",
            bundle.feature_names().join(", ")
        );
    }
    let ordered = bundle.feature_names().iter().filter_map(|name| {
        values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(n, v)| (n.clone(), *v))
    });
    let raw = FeatureVector::from_pairs(ordered)?;
    if let Some(screen) = VitalReadings::screen(&raw, sex) {
        for problem in &screen.out_of_range {
            tracing::warn!("Input outside plausible range: {problem}");
        }
        if !screen.abnormal.is_empty() {
            let names: Vec<String> = screen.abnormal.iter().map(ToString::to_string).collect();
            tracing::info!("Vitals outside reference range: {}", names.join(", "));
        }
    }
    Ok(DiseasePredictor::assess(&raw, &bundle, threshold, rules)?)
}

fn print_assessment(assessment: &Assessment) {
    let prediction = &assessment.prediction;
    println!("Disease probabilities (threshold {}):", prediction.threshold());
    for (name, p) in prediction.ranked() {
        let marker = if prediction.is_positive(name) { "*" } else { " " };
        println!(
            " {marker} {name:<22} {:>5.1}%  {}",
            p * 100.0,
            prediction.risk_level(name).map_or("", |r| r.description())
        );
    }

    let diet = &assessment.diet;
    println!("\n{}", diet.headline());
    for category in [
        DirectiveCategory::Eat,
        DirectiveCategory::Avoid,
        DirectiveCategory::Supplement,
        DirectiveCategory::Monitor,
        DirectiveCategory::Lifestyle,
    ] {
        let items: Vec<_> = diet.by_category(category).collect();
        if items.is_empty() {
            continue;
        }
        println!("  {category}:");
        for directive in items {
            println!("    - {}", directive.text);
        }
    }
    for s in &diet.suppressed {
        println!(
            "  (dropped from {}: \"{}\", overridden by {})",
            s.source, s.directive.text, s.overridden_by
        );
    }
    if !diet.wellness && !diet.uncovered.is_empty() {
        let names: Vec<&str> = diet.uncovered.iter().map(String::as_str).collect();
        println!("  No diet rule for: {}", names.join(", "));
    }
    if let Some(plan) = &diet.meal_plan {
        println!("\nSample meal plan:");
        for (meal, items) in [
            ("Breakfast", &plan.breakfast),
            ("Lunch", &plan.lunch),
            ("Dinner", &plan.dinner),
            ("Snacks", &plan.snacks),
        ] {
            println!("  {meal}: {}", items.join("; "));
        }
    }
}
