use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use fair_game::prelude::*;
use tracing::{Level, Metadata};
use tracing_subscriber::{
    fmt,
    layer::{Context, Filter, SubscriberExt},
    Layer, Registry,
};

struct CustomLevelFilter;
impl<S> Filter<S> for CustomLevelFilter {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        meta.level() <= &Level::INFO
    }
}

fn init_debug_logger() {
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_target(false);

    let reg = Registry::default().with(
        fmt::layer()
            .event_format(format)
            .with_test_writer()
            .with_filter(CustomLevelFilter),
    );

    let _ = tracing::subscriber::set_global_default(reg);
}

const NAMES: [&str; 3] = ["Alice", "Bob", "Charlie"];

fn scripted(scripts: [&[&str]; 3]) -> Vec<Participant> {
    NAMES
        .iter()
        .zip(scripts)
        .map(|(name, script)| {
            let service = ScriptedService::new(script.iter().copied());
            Participant::new(*name, "scripted", Box::new(service))
        })
        .collect()
}

fn logged(scripts: [&[&str]; 3], log: &PromptLog) -> Vec<Participant> {
    NAMES
        .iter()
        .zip(scripts)
        .map(|(name, script)| {
            let service = ScriptedService::new(script.iter().copied()).with_prompt_log(log.clone());
            Participant::new(*name, "scripted", Box::new(service))
        })
        .collect()
}

fn game(kind: GameKind, settings: GameSettings, participants: Vec<Participant>) -> FairGame {
    let template = PromptTemplate::new(kind.template(settings.language()).unwrap());
    FairGame::new(kind.description(), settings, kind.payoff_table(), template, participants)
        .unwrap()
}

fn quick() -> GameSettings {
    GameSettings::new().with_retry(3, Duration::ZERO).with_seed(7)
}

#[test]
fn cooperative_prisoners_dilemma() {
    init_debug_logger();
    let participants = scripted([&["Cooperate"], &["Cooperate"], &["Cooperate"]]);
    let mut game = game(GameKind::PrisonersDilemma, quick().with_rounds(3), participants);

    assert_eq!(game.run().unwrap(), StopReason::RoundLimit);
    assert_eq!(game.scores(), vec![21, 21, 21]);
    assert_eq!(game.history().len(), 3);
    for (_, records) in game.history().rounds() {
        assert_eq!(records.len(), 3);
        for record in records {
            assert!(!record.is_noise);
            assert_eq!(record.strategy.as_deref(), Some("Cooperate"));
            assert_eq!(record.intended_strategy.as_deref(), Some("Cooperate"));
            assert_eq!(record.score, Some(7));
        }
    }
}

#[test]
fn certain_noise_flips_every_action() {
    init_debug_logger();
    let participants = scripted([&["Cooperate"], &["Cooperate"], &["Cooperate"]]);
    let settings = quick().with_rounds(3).with_noise(1.0);
    let mut game = game(GameKind::PrisonersDilemma, settings, participants);
    game.run().unwrap();

    for (round, records) in game.history().rounds() {
        for record in records {
            assert!(record.is_noise, "{} not flipped in round {round}", record.agent);
            assert_eq!(record.intended_strategy.as_deref(), Some("Cooperate"));
            assert_eq!(record.strategy.as_deref(), Some("Defect"));
            // paid on the executed DDD, not the intended CCC
            assert_eq!(record.score, Some(1));
        }
    }
    assert_eq!(game.history().noise_events(), 9);
    assert_eq!(game.scores(), vec![3, 3, 3]);
    let vocabulary = game.payoff().strategies().to_vec();
    assert_eq!(game.history().cooperation_rate(&vocabulary), Some(0.0));
}

#[test]
fn unparsable_answers_fall_back_to_first_strategy() {
    init_debug_logger();
    let participants = scripted([&["xyz"], &["I refuse to answer"], &["Defect"]]);
    let mut game = game(GameKind::PrisonersDilemma, quick().with_rounds(1), participants);
    game.run().unwrap();

    let round = game.history().round(1).unwrap();
    assert_eq!(round[0].strategy.as_deref(), Some("Cooperate"));
    assert_eq!(round[1].strategy.as_deref(), Some("Cooperate"));
    assert_eq!(round[2].strategy.as_deref(), Some("Defect"));
    // CCD: the lone defector is tempted, the others are suckers
    assert_eq!(game.scores(), vec![0, 0, 9]);
}

#[test]
fn stop_tag_ends_the_game_early() {
    init_debug_logger();
    let script: &[&str] = &["Cooperate", "Defect"];
    let participants = scripted([script, script, script]);
    let settings = quick().with_rounds(10).with_stop_tags(["DDD"]);
    let mut game = game(GameKind::PrisonersDilemma, settings, participants);

    assert_eq!(game.run().unwrap(), StopReason::StopTag("DDD".to_owned()));
    assert_eq!(game.history().len(), 2);
    assert_eq!(game.scores(), vec![8, 8, 8]);
}

#[test]
fn unknown_stop_tag_is_rejected() {
    let participants = scripted([&["Cooperate"], &["Cooperate"], &["Cooperate"]]);
    let kind = GameKind::PrisonersDilemma;
    let template = PromptTemplate::new(kind.template("en").unwrap());
    let err = FairGame::new(
        kind.description(),
        GameSettings::new().with_stop_tags(["XYZ"]),
        kind.payoff_table(),
        template,
        participants,
    )
    .unwrap_err();
    assert!(err.is_configuration_defect());
}

#[test]
fn no_same_round_leakage() {
    init_debug_logger();
    let log = PromptLog::new();
    let participants = logged([&["Defect"], &["Cooperate"], &["Defect"]], &log);
    let mut game = game(GameKind::PrisonersDilemma, quick().with_rounds(3), participants);
    game.run().unwrap();

    let prompts = log.prompts();
    assert_eq!(prompts.len(), 9);
    for (i, prompt) in prompts.iter().enumerate() {
        let round = i / 3 + 1;
        for earlier in 1..round {
            assert!(prompt.contains(&format!("Round {earlier}: Alice=D, Bob=C, Charlie=D")));
        }
        for later in round..=3 {
            assert!(!prompt.contains(&format!("Round {later}:")), "prompt {i} leaks round {later}");
        }
    }
    assert!(prompts[0].contains("No rounds played yet."));
}

#[test]
fn messages_reach_the_next_round_only() {
    init_debug_logger();
    let log = PromptLog::new();
    let participants = logged(
        [
            &["Let's all cooperate", "Cooperate"],
            &["Agreed", "Cooperate"],
            &["Sure", "Cooperate"],
        ],
        &log,
    );
    let settings = quick().with_rounds(2).with_communicate(true);
    let mut game = game(GameKind::PrisonersDilemma, settings, participants);
    game.run().unwrap();

    let records = game.history().round(1).unwrap();
    assert_eq!(records[0].message.as_deref(), Some("Let's all cooperate"));

    let prompts = log.prompts();
    // per round: three messages then three choices
    assert_eq!(prompts.len(), 12);
    assert!(prompts[..6].iter().all(|p| !p.contains("Let's all cooperate")));
    assert!(prompts[6..]
        .iter()
        .all(|p| p.contains("Alice: \"Let's all cooperate\"")));
    assert!(prompts[0].contains("write ONE short message"));
    assert!(!prompts[0].contains("EXACTLY one word"));
    assert!(prompts[3].contains("EXACTLY one word"));
}

#[test]
fn history_survives_json() {
    init_debug_logger();
    let participants = scripted([&["Contribute"], &["Keep"], &["Contribute", "Keep"]]);
    let settings = quick().with_rounds(3).with_reasoning(true).with_probe_rounds([2]);
    let mut game = game(GameKind::PublicGoods, settings, participants);
    game.run().unwrap();

    let text = serde_json::to_string_pretty(game.history()).unwrap();
    assert!(text.contains("\"round_1\""));
    assert!(text.contains("\"meta_prompt_validation\""));
    let back: History = serde_json::from_str(&text).unwrap();
    assert_eq!(&back, game.history());
}

#[test]
fn cancellation_keeps_completed_rounds() {
    init_debug_logger();
    let token = CancelToken::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let alice = {
        let token = token.clone();
        let calls = calls.clone();
        FnService(move |_: &str| -> anyhow::Result<String> {
            if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                token.cancel();
            }
            Ok("Cooperate".to_owned())
        })
    };
    let mut participants = scripted([&[], &["Cooperate"], &["Cooperate"]]);
    participants[0] = Participant::new("Alice", "closure", Box::new(alice));
    let mut game =
        game(GameKind::PrisonersDilemma, quick().with_rounds(5), participants).with_cancel_token(token);

    assert_eq!(game.run().unwrap(), StopReason::Cancelled);
    assert_eq!(game.history().len(), 1);
    assert!(game.participants().iter().all(|p| p.scores().len() == 1));
    assert_eq!(game.scores(), vec![7, 7, 7]);
}

#[test]
fn exhausted_service_aborts_but_keeps_history() {
    init_debug_logger();
    let calls = Arc::new(AtomicUsize::new(0));
    let bob = {
        let calls = calls.clone();
        FnService(move |_: &str| {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok("Defect".to_owned())
            } else {
                Err(anyhow!("rate limited"))
            }
        })
    };
    let mut participants = scripted([&["Cooperate"], &[], &["Cooperate"]]);
    participants[1] = Participant::new("Bob", "closure", Box::new(bob));
    let mut game = game(GameKind::PrisonersDilemma, quick().with_rounds(5), participants);

    let err = game.run().unwrap_err();
    match err {
        GameError::DecisionServiceExhausted {
            agent,
            attempts,
            last_error,
        } => {
            assert_eq!(agent, "Bob");
            assert_eq!(attempts, 3);
            assert!(last_error.contains("rate limited"));
        }
        other => panic!("unexpected error {other}"),
    }
    // two successful calls, then three failed attempts
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(game.history().len(), 2);
    assert!(game.participants().iter().all(|p| p.actions().len() == 2));
    assert_eq!(game.scores(), vec![0, 18, 0]);
}

#[test]
fn sanctions_apply_cost_and_fine_once() {
    init_debug_logger();
    let participants = scripted([
        &["Contribute", "Bob, and again Bob"],
        &["Keep", "None"],
        &["Contribute", "None of them"],
    ]);
    let settings = quick().with_rounds(1).with_sanctions(true);
    let mut game = game(GameKind::PublicGoods, settings, participants);
    game.run().unwrap();

    // CDC: suckers get 2, the free rider 12; Alice pays 1, Bob is fined 3
    assert_eq!(game.scores(), vec![1, 9, 2]);
    let round = game.history().round(1).unwrap();
    assert_eq!(round[0].punished, vec!["Bob".to_owned()]);
    assert_eq!(round[1].was_punished_by, vec!["Alice".to_owned()]);
    assert!(round[2].punished.is_empty());
    assert_eq!(round[0].score, Some(1));
    assert_eq!(round[1].score, Some(9));
}

#[test]
fn checkpoint_follows_every_round() {
    init_debug_logger();
    let path = std::env::temp_dir().join(format!("fair-game-{}-session.json", std::process::id()));
    let participants = scripted([&["Volunteer"], &["Ignore"], &["Ignore"]]);
    let mut game = game(GameKind::VolunteersDilemma, quick().with_rounds(4), participants)
        .with_observer(IncrementalSaver::new(&path));
    game.run().unwrap();

    let checkpoint = load_checkpoint(&path).unwrap();
    assert_eq!(checkpoint.current_round, 4);
    assert_eq!(&checkpoint.history, game.history());
    assert_eq!(game.scores(), vec![320, 400, 400]);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn vietnamese_session_uses_localized_vocabulary() {
    init_debug_logger();
    let participants = scripted([&["Hợp tác"], &["Phản bội"], &["Tôi chọn Hợp tác"]]);
    let settings = quick().with_language("vn").with_rounds(1);
    let mut game = game(GameKind::PrisonersDilemma, settings, participants);
    game.run().unwrap();

    let round = game.history().round(1).unwrap();
    assert_eq!(round[1].strategy.as_deref(), Some("Phản bội"));
    assert_eq!(round[2].strategy.as_deref(), Some("Hợp tác"));
}

#[test]
fn mock_batch_over_models_and_languages() {
    init_debug_logger();
    let dir = std::env::temp_dir().join(format!("fair-game-{}-batch", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let kind = GameKind::PublicGoods;
    let mut config = ExperimentConfig::for_game(kind, 3);
    config.seed = Some(11);
    let mut registry = ServiceRegistry::new();
    registry.register("Broken", |_request| {
        let service: Box<dyn DecisionService> = Box::new(FnService(|_: &str| -> anyhow::Result<String> {
            Err(anyhow!("offline"))
        }));
        Ok(service)
    });
    let options = BatchOptions {
        base: GameSettings::new().with_retry(2, Duration::ZERO),
        checkpoint_dir: Some(dir.clone()),
        ..BatchOptions::default()
    };

    let results = run_experiments_with(
        &config,
        kind,
        &["MockModel".to_owned(), "Broken".to_owned()],
        &["en".to_owned(), "vn".to_owned()],
        &registry,
        &options,
    );

    assert_eq!(results.len(), 4);
    for lang in ["en", "vn"] {
        let ok = &results[&experiment_key(kind, "MockModel", lang, 0.0)];
        assert!(ok.error.is_none());
        assert_eq!(ok.history.len(), 3);
        assert_eq!(ok.description, "Public Goods Game (3-Player)");

        let broken = &results[&format!("PGG_Broken_{lang}_Noise0.0")];
        assert!(broken.history.is_empty());
        assert!(broken.error.as_deref().unwrap().contains("offline"));
    }

    let file = dir.join(results_file_name(kind.tag(), 0));
    save_results(&file, &results).unwrap();
    assert_eq!(load_results(&file).unwrap(), results);
    std::fs::remove_dir_all(&dir).unwrap();
}
