use clap::Args;
use reveille_core::challenge::{self, RandomSource};
use reveille_core::{Difficulty, SeededRandom, ThreadRandom};

#[derive(Args)]
pub struct ChallengeArgs {
    /// Challenge tier: easy, medium or hard
    #[arg(long, default_value = "medium")]
    difficulty: Difficulty,
    /// Seed for a reproducible problem
    #[arg(long)]
    seed: Option<u64>,
    /// Check an answer instead of printing only the problem
    #[arg(long, allow_hyphen_values = true)]
    answer: Option<i64>,
}

pub fn run(args: ChallengeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut rng: Box<dyn RandomSource> = match args.seed {
        Some(seed) => Box::new(SeededRandom::new(seed)),
        None => Box::new(ThreadRandom),
    };
    let challenge = challenge::generate(args.difficulty, rng.as_mut());
    println!("{}", challenge.problem_text);

    if let Some(answer) = args.answer {
        if challenge::verify(&challenge, answer) {
            println!("correct");
        } else {
            return Err(format!("incorrect, expected {}", challenge.expected_answer).into());
        }
    }
    Ok(())
}
