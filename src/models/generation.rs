//! Token generation loops (greedy and beam search) over a logits callback

use anyhow::Result;
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
	pub max_new_tokens: usize,
	pub num_beams: usize,
	pub eos_token_id: u32,
	/// Ban any n-gram from occurring twice (0 = off)
	pub no_repeat_ngram_size: usize,
}

impl GenerationConfig {
	pub fn greedy(max_new_tokens: usize, eos_token_id: u32) -> Self {
		Self {
			max_new_tokens,
			num_beams: 1,
			eos_token_id,
			no_repeat_ngram_size: 0,
		}
	}
}

/// Generate from `prefix` with `num_beams` beams; one beam is greedy search.
///
/// `step` returns next-token logits for a full sequence. The returned
/// sequence includes the prefix and, when reached, the EOS token.
pub fn generate<F>(prefix: Vec<u32>, config: &GenerationConfig, step: F) -> Result<Vec<u32>>
where
	F: FnMut(&[u32]) -> Result<Vec<f32>>,
{
	if config.num_beams <= 1 {
		greedy(prefix, config, step)
	} else {
		beam_search(prefix, config, step)
	}
}

pub fn greedy<F>(mut tokens: Vec<u32>, config: &GenerationConfig, mut step: F) -> Result<Vec<u32>>
where
	F: FnMut(&[u32]) -> Result<Vec<f32>>,
{
	for _ in 0..config.max_new_tokens {
		let mut logits = step(&tokens)?;
		ban_repeated_ngrams(&tokens, config.no_repeat_ngram_size, &mut logits);

		let next = argmax(&logits).ok_or_else(|| anyhow::anyhow!("Empty logits"))?;
		tokens.push(next);
		if next == config.eos_token_id {
			break;
		}
	}
	Ok(tokens)
}

struct Beam {
	tokens: Vec<u32>,
	score: f32,
}

impl Beam {
	/// Length-normalized log probability
	fn normalized(&self) -> f32 {
		self.score / self.tokens.len().max(1) as f32
	}
}

pub fn beam_search<F>(prefix: Vec<u32>, config: &GenerationConfig, mut step: F) -> Result<Vec<u32>>
where
	F: FnMut(&[u32]) -> Result<Vec<f32>>,
{
	let width = config.num_beams.max(1);
	let mut alive = vec![Beam { tokens: prefix, score: 0.0 }];
	let mut finished: Vec<Beam> = Vec::new();

	for _ in 0..config.max_new_tokens {
		let mut candidates: Vec<(usize, u32, f32)> = Vec::new();

		for (index, beam) in alive.iter().enumerate() {
			let mut logits = step(&beam.tokens)?;
			ban_repeated_ngrams(&beam.tokens, config.no_repeat_ngram_size, &mut logits);
			let log_probs = log_softmax(&logits);

			for (token, lp) in top_k(&log_probs, 2 * width) {
				candidates.push((index, token, beam.score + lp));
			}
		}

		candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));

		let mut next = Vec::with_capacity(width);
		for (index, token, score) in candidates {
			let mut tokens = alive[index].tokens.clone();
			tokens.push(token);
			let beam = Beam { tokens, score };

			if token == config.eos_token_id {
				finished.push(beam);
			} else {
				next.push(beam);
			}
			if next.len() == width {
				break;
			}
		}

		alive = next;
		if alive.is_empty() || is_done(&finished, &alive, width) {
			break;
		}
	}

	finished.extend(alive);
	let best = finished
		.into_iter()
		.max_by(|a, b| a.normalized().partial_cmp(&b.normalized()).unwrap_or(Ordering::Equal))
		.map(|beam| beam.tokens)
		.unwrap_or_default();
	Ok(best)
}

/// Enough hypotheses finished and no live beam can still beat the worst of them
fn is_done(finished: &[Beam], alive: &[Beam], width: usize) -> bool {
	if finished.len() < width {
		return false;
	}
	let worst = finished
		.iter()
		.map(Beam::normalized)
		.fold(f32::INFINITY, f32::min);
	let best_alive = alive
		.iter()
		.map(Beam::normalized)
		.fold(f32::NEG_INFINITY, f32::max);
	best_alive <= worst
}

pub fn argmax(values: &[f32]) -> Option<u32> {
	values
		.iter()
		.enumerate()
		.max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
		.map(|(i, _)| i as u32)
}

pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
	let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
	let sum: f32 = logits.iter().map(|&v| (v - max).exp()).sum();
	let log_sum = sum.ln() + max;
	logits.iter().map(|&v| v - log_sum).collect()
}

fn top_k(values: &[f32], k: usize) -> Vec<(u32, f32)> {
	let mut indexed: Vec<(u32, f32)> = values
		.iter()
		.enumerate()
		.filter(|(_, v)| v.is_finite())
		.map(|(i, &v)| (i as u32, v))
		.collect();
	indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
	indexed.truncate(k);
	indexed
}

/// Set the logit of every token that would complete an already seen n-gram
/// to negative infinity
fn ban_repeated_ngrams(tokens: &[u32], n: usize, logits: &mut [f32]) {
	if n == 0 || tokens.len() + 1 < n {
		return;
	}
	let tail = &tokens[tokens.len() + 1 - n..];
	let banned: HashSet<u32> = tokens
		.windows(n)
		.filter(|w| &w[..n - 1] == tail)
		.map(|w| w[n - 1])
		.collect();

	for token in banned {
		if let Some(v) = logits.get_mut(token as usize) {
			*v = f32::NEG_INFINITY;
		}
	}
}
