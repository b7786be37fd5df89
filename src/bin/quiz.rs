use anyhow::Context;
use book_quiz::quiz::model::{AgeRange, OptionLetter, Quiz};
use book_quiz::session::{
    run_generation, run_submission, CoverFinder, FileStorage, HttpQuizApi, NoSpeechEngine, Phase, QuizSession,
    Tone,
};
use book_quiz::SessionError;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about = "📚 Take a book quiz in the terminal", long_about = None)]
struct Args {
    /// Quiz server base URL
    #[arg(short, long, default_value = "http://localhost:3000")]
    server: String,

    /// Where the form, quiz and answers are kept between runs
    #[arg(long, default_value = ".book-quiz")]
    state_dir: PathBuf,
}

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "book_quiz=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let api = HttpQuizApi::new(&args.server);
    let covers = CoverFinder::default();
    let mut session = QuizSession::restore(FileStorage::new(&args.state_dir), Box::new(NoSpeechEngine), Instant::now());
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    if session.phase() == Phase::Taking {
        println!("Resuming your saved quiz.");
    }

    loop {
        let keep_going = match session.phase() {
            Phase::Input => fill_form(&mut session, &mut input, &api, &covers).await?,
            Phase::Taking => take_quiz(&mut session, &mut input, &api).await?,
            Phase::Results => show_results(&mut session, &mut input).await?,
            Phase::Loading(_) => {
                // Only reachable if a request was abandoned; start over.
                session.back_to_input().context("Failed to leave loading state")?;
                true
            }
        };
        print_status(&mut session);
        if !keep_going {
            return Ok(());
        }
    }
}

async fn ask(input: &mut Input, prompt: &str) -> anyhow::Result<Option<String>> {
    print!("{}", prompt);
    std::io::stdout().flush().context("Failed to write prompt")?;
    Ok(input.next_line().await.context("Failed to read input")?.map(|l| l.trim().to_string()))
}

fn print_status(session: &mut QuizSession<FileStorage>) {
    if let Some(status) = session.take_status() {
        match status.tone {
            Tone::Info => println!("ℹ️  {}", status.text),
            Tone::Error => println!("❌ {}", status.text),
        }
    }
}

async fn fill_form(
    session: &mut QuizSession<FileStorage>,
    input: &mut Input,
    api: &HttpQuizApi,
    covers: &CoverFinder,
) -> anyhow::Result<bool> {
    let current = session.config().clone();
    let Some(book) = ask(input, &format!("Book [{}] (\"generic\" for no book): ", current.book)).await? else {
        return Ok(false);
    };
    let Some(chapters) = ask(input, &format!("Chapters [{}]: ", current.chapters)).await? else {
        return Ok(false);
    };
    let age_hint = current.age_range.map(|a| a.to_string()).unwrap_or_default();
    let Some(age) = ask(input, &format!("Age range (5-7, 8-10, 11-13, 14+) [{}]: ", age_hint)).await? else {
        return Ok(false);
    };

    session.edit_config(|config| {
        if book.eq_ignore_ascii_case("generic") {
            config.use_generic = true;
        } else if !book.is_empty() {
            config.book = book;
            config.use_generic = false;
        }
        if !chapters.is_empty() {
            config.chapters = chapters;
        }
        if !age.is_empty() {
            config.age_range = age.parse::<AgeRange>().ok();
        }
    })?;

    println!("⏳ Generating quiz...");
    match run_generation(session, api, covers).await {
        Ok(_) | Err(SessionError::Validation(_)) => Ok(true),
        Err(e) => Err(e.into()),
    }
}

fn print_quiz(session: &QuizSession<FileStorage>, quiz: &Quiz) {
    for warning in session.warnings() {
        println!("⚠️  {}", warning);
    }
    if let Some(background) = session.background() {
        println!("🖼  {}", background.url);
    }
    for (i, mcq) in quiz.mcqs.iter().enumerate() {
        println!("\n{}. {}", i + 1, mcq.question);
        for (letter, text) in &mcq.options {
            println!("   {}) {}", letter, text);
        }
    }
    for (i, question) in quiz.open_ended.iter().enumerate() {
        println!("\n{}. {}", quiz.open_question_number(i), question.question);
    }
    println!();
}

async fn take_quiz(
    session: &mut QuizSession<FileStorage>,
    input: &mut Input,
    api: &HttpQuizApi,
) -> anyhow::Result<bool> {
    let quiz = session.quiz().cloned().ok_or(SessionError::NoQuiz)?;
    print_quiz(session, &quiz);

    for n in 1..=quiz.mcqs.len() {
        let saved = session.answers().mcq(n).unwrap_or("").to_string();
        let Some(reply) = ask(input, &format!("Answer {} [{}]: ", n, saved)).await? else {
            return Ok(false);
        };
        if reply.is_empty() {
            continue;
        }
        match reply.parse::<OptionLetter>() {
            Ok(letter) => session.select_option(n, letter)?,
            Err(e) => println!("{}", e),
        }
    }
    for i in 0..quiz.open_ended.len() {
        let open_n = i + 1;
        let saved = session.answers().open(open_n).to_string();
        let prompt = format!("Answer {} [{}]: ", quiz.open_question_number(i), saved);
        let Some(reply) = ask(input, &prompt).await? else {
            return Ok(false);
        };
        if !reply.is_empty() {
            session.write_answer(open_n, reply, Instant::now())?;
        }
    }
    session.tick(Instant::now());

    let Some(choice) = ask(input, "[s]ubmit, [r]eset answers, [b]ack to search, [q]uit: ").await? else {
        return Ok(false);
    };
    match choice.as_str() {
        "s" => {
            println!("⏳ Evaluating answers...");
            run_submission(session, api).await?;
        }
        "r" => session.reset_answers()?,
        "b" => session.back_to_input()?,
        "q" => return Ok(false),
        _ => {}
    }
    Ok(true)
}

async fn show_results(session: &mut QuizSession<FileStorage>, input: &mut Input) -> anyhow::Result<bool> {
    if let Some(results) = session.results() {
        println!();
        for line in &results.feedback_lines {
            println!("{}", line);
        }
        println!("\n{}", results.score);
    }
    let Some(choice) = ask(input, "[r]etake, [n]ew quiz, [q]uit: ").await? else {
        return Ok(false);
    };
    match choice.as_str() {
        "r" => session.retake()?,
        "n" => session.start_new()?,
        "q" => return Ok(false),
        _ => {}
    }
    Ok(true)
}
