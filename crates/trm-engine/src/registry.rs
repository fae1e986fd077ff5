//! Catálogo compartilhado de packs e regras
//!
//! Carregado uma vez no startup e compartilhado read-only por todo
//! handler: packs builtin (aleatórios, seedados), packs semânticos
//! aprendidos do cache de operadores, e o rule set do motor de regras.
//! Leitores concorrentes são seguros sem lock - nada aqui muta depois
//! do load.

use nalgebra::DMatrix;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use trm_common::{Result, TrmError};
use trm_config::TrmConfig;
use trm_core::{builtin_packs, load_all_packs, random_projection, PovmPack, SemanticPack};

use crate::context::MeasurementScope;
use crate::rules::RuleSet;

/// Catálogo imutável do processo
pub struct Catalog {
    packs: BTreeMap<String, Arc<PovmPack>>,
    semantic: BTreeMap<String, Arc<SemanticPack>>,
    rules: Arc<RuleSet>,
    rank: usize,
    shrinkage: f64,
    seed: u64,
}

impl Catalog {
    /// Monta o catálogo a partir da configuração.
    ///
    /// Packs aprendidos têm precedência sobre os aleatórios de mesmo
    /// nome: são determinísticos e semanticamente calibrados.
    pub fn load(config: &TrmConfig) -> Result<Self> {
        let rank = config.core.rank;
        let seed = config.core.seed;

        let mut packs = builtin_packs(rank, seed)?;
        packs.retain(|name, _| config.core.default_packs.contains(name));

        let mut semantic = BTreeMap::new();
        let operators_dir = config.operators_dir();
        if operators_dir.is_dir() {
            for pack in load_all_packs(&operators_dir)? {
                if pack.rank != rank {
                    debug!(
                        "pack aprendido '{}' ignorado: rank {} ≠ {}",
                        pack.name, pack.rank, rank
                    );
                    continue;
                }
                semantic.insert(pack.name.clone(), Arc::new(pack));
            }
        }

        let rules_path = config.rules_path();
        let rules = if rules_path.exists() {
            Arc::new(RuleSet::load(&rules_path)?)
        } else {
            debug!(
                "sem rule set em {}, usando regras embutidas",
                rules_path.display()
            );
            Arc::new(RuleSet::builtin())
        };

        info!(
            "catálogo carregado: {} packs builtin, {} aprendidos, rank {}",
            packs.len(),
            semantic.len(),
            rank
        );

        Ok(Self {
            packs,
            semantic,
            rules,
            rank,
            shrinkage: config.core.shrinkage,
            seed,
        })
    }

    /// Nomes de todos os packs endereçáveis
    pub fn pack_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.packs.keys().map(|k| k.as_str()).collect();
        for name in self.semantic.keys() {
            if !self.packs.contains_key(name) {
                names.push(name);
            }
        }
        names.sort_unstable();
        names
    }

    /// Pack POVM por nome; aprendido tem precedência sobre aleatório
    pub fn povm(&self, name: &str) -> Result<Arc<PovmPack>> {
        if let Some(semantic) = self.semantic.get(name) {
            return Ok(Arc::new(semantic.povm().clone()));
        }
        self.packs.get(name).cloned().ok_or_else(|| {
            TrmError::InvalidInput(format!(
                "pack desconhecido '{name}'; disponíveis: {:?}",
                self.pack_names()
            ))
        })
    }

    /// Pack aprendido por nome, se existir
    pub fn semantic(&self, name: &str) -> Option<Arc<SemanticPack>> {
        self.semantic.get(name).cloned()
    }

    pub fn rules(&self) -> Arc<RuleSet> {
        self.rules.clone()
    }

    /// Escopo de medição para uma transformação sobre o pack dado.
    ///
    /// Pack aprendido → projeção fixa armazenada com ele (caminho
    /// determinístico). Pack aleatório → projeção seedada do catálogo,
    /// estável dentro do processo.
    pub fn scope(&self, pack_name: &str, embedding_dim: usize) -> Result<MeasurementScope> {
        if let Some(semantic) = self.semantic.get(pack_name) {
            let projection = semantic.projection();
            if projection.nrows() != embedding_dim {
                return Err(TrmError::InvalidInput(format!(
                    "pack '{pack_name}' aprendido para dimensão {}, adaptador fornece {embedding_dim}",
                    projection.nrows()
                )));
            }
            return Ok(MeasurementScope::new(
                Arc::new(semantic.povm().clone()),
                Arc::new(projection.clone()),
                self.shrinkage,
            ));
        }

        let pack = self.povm(pack_name)?;
        let projection: DMatrix<f64> = random_projection(embedding_dim, self.rank, self.seed);
        Ok(MeasurementScope::new(
            pack,
            Arc::new(projection),
            self.shrinkage,
        ))
    }
}
