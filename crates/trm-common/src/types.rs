//! Tipos de valor compartilhados: leituras POVM e postura alvo

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Distribuição de probabilidades produzida ao medir um ρ com um pack.
///
/// Mantém a ordem estável dos eixos do pack e expõe também uma visão de
/// mapa. Os valores já chegam clipados em [0,1] e renormalizados para
/// somar 1 (dentro de 1e-6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Readings {
    axes: Vec<(String, f64)>,
}

impl Readings {
    pub fn from_pairs(axes: Vec<(String, f64)>) -> Self {
        Self { axes }
    }

    /// Probabilidade de um eixo, se existir no pack
    pub fn get(&self, axis: &str) -> Option<f64> {
        self.axes.iter().find(|(a, _)| a == axis).map(|(_, p)| *p)
    }

    /// Lista ordenada (ordem dos operadores do pack)
    pub fn pairs(&self) -> &[(String, f64)] {
        &self.axes
    }

    /// Visão de mapa para serialização e comparação
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.axes.iter().cloned().collect()
    }

    pub fn sum(&self) -> f64 {
        self.axes.iter().map(|(_, p)| p).sum()
    }

    /// Eixo dominante (maior probabilidade)
    pub fn dominant(&self) -> Option<(&str, f64)> {
        self.axes
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(a, p)| (a.as_str(), *p))
    }

    /// Delta por eixo: `depois − antes`, na ordem deste `Readings`
    pub fn delta(&self, before: &Readings) -> Vec<(String, f64)> {
        self.axes
            .iter()
            .map(|(axis, after)| {
                let b = before.get(axis).unwrap_or(0.0);
                (axis.clone(), after - b)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }
}

/// Alvo de um pack: um eixo a maximizar ou uma distribuição desejada
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StanceTarget {
    Axis(String),
    Distribution(BTreeMap<String, f64>),
}

/// Postura semântica alvo: pack → alvo.
///
/// Reduzida a um score escalar de convergência pela média da massa de
/// probabilidade nos eixos alvo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetStance {
    pub targets: BTreeMap<String, StanceTarget>,
}

impl TargetStance {
    pub fn single_axis(pack: impl Into<String>, axis: impl Into<String>) -> Self {
        let mut targets = BTreeMap::new();
        targets.insert(pack.into(), StanceTarget::Axis(axis.into()));
        Self { targets }
    }

    /// Score de convergência em [0, 1] dado o conjunto de leituras atuais.
    ///
    /// Para `Axis`, usa a probabilidade do eixo; para `Distribution`, a
    /// massa medida ponderada pelos pesos do alvo. Packs sem leitura
    /// contam como 0.
    pub fn convergence_score(&self, readings: &BTreeMap<String, Readings>) -> f64 {
        if self.targets.is_empty() {
            return 0.0;
        }

        let mut scores = Vec::with_capacity(self.targets.len());
        for (pack, target) in &self.targets {
            let score = match (target, readings.get(pack)) {
                (StanceTarget::Axis(axis), Some(r)) => r.get(axis).unwrap_or(0.0),
                (StanceTarget::Distribution(dist), Some(r)) => {
                    let total_weight: f64 = dist.values().sum();
                    if total_weight <= 0.0 {
                        0.0
                    } else {
                        dist.iter()
                            .map(|(axis, w)| w * r.get(axis).unwrap_or(0.0))
                            .sum::<f64>()
                            / total_weight
                    }
                }
                (_, None) => 0.0,
            };
            scores.push(score);
        }

        scores.iter().sum::<f64>() / scores.len() as f64
    }
}
