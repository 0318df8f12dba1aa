//! End-to-end realization building from in-memory logic tree files

use std::path::PathBuf;
use std::sync::Arc;

use quake_logictree::prelude::*;
use quake_logictree::{LogicTreeError, SourceRef, TrtSmr, TWO24};

const SM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<nrml xmlns="http://openquake.org/xmlns/nrml/0.5">
  <sourceModel name="sm">
    <sourceGroup tectonicRegion="Active Shallow Crust">
      <pointSource id="srcA" name="a"/>
      <pointSource id="srcB" name="b"/>
    </sourceGroup>
  </sourceModel>
</nrml>
"#;

const GMPE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nrml xmlns="http://openquake.org/xmlns/nrml/0.5">
  <logicTree logicTreeID="lt1">
    <logicTreeBranchSet uncertaintyType="gmpeModel" branchSetID="bs1"
                        applyToTectonicRegionType="Active Shallow Crust">
      <logicTreeBranch branchID="g1">
        <uncertaintyModel>SadighEtAl1997</uncertaintyModel>
        <uncertaintyWeight>0.9</uncertaintyWeight>
      </logicTreeBranch>
      <logicTreeBranch branchID="g2">
        <uncertaintyModel>ToroEtAl2002</uncertaintyModel>
        <uncertaintyWeight>0.1</uncertaintyWeight>
      </logicTreeBranch>
    </logicTreeBranchSet>
  </logicTree>
</nrml>
"#;

const GMPE3: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nrml xmlns="http://openquake.org/xmlns/nrml/0.5">
  <logicTree logicTreeID="lt1">
    <logicTreeBranchSet uncertaintyType="gmpeModel" branchSetID="bs1"
                        applyToTectonicRegionType="Active Shallow Crust">
      <logicTreeBranch branchID="g1">
        <uncertaintyModel>SadighEtAl1997</uncertaintyModel>
        <uncertaintyWeight>0.5</uncertaintyWeight>
      </logicTreeBranch>
      <logicTreeBranch branchID="g2">
        <uncertaintyModel>ToroEtAl2002</uncertaintyModel>
        <uncertaintyWeight>0.3</uncertaintyWeight>
      </logicTreeBranch>
      <logicTreeBranch branchID="g3">
        <uncertaintyModel>BooreAtkinson2008</uncertaintyModel>
        <uncertaintyWeight>0.2</uncertaintyWeight>
      </logicTreeBranch>
    </logicTreeBranchSet>
  </logicTree>
</nrml>
"#;

fn branch(id: &str, value: &str, weight: &str) -> String {
    format!(
        "<logicTreeBranch branchID=\"{id}\"><uncertaintyModel>{value}</uncertaintyModel>\
         <uncertaintyWeight>{weight}</uncertaintyWeight></logicTreeBranch>"
    )
}

fn smlt(bsets: &[String]) -> String {
    let root = format!(
        "<logicTreeBranchSet branchSetID=\"bs0\" uncertaintyType=\"sourceModel\">{}</logicTreeBranchSet>",
        branch("b1", "sm.xml", "1.0")
    );
    format!(
        "<nrml xmlns=\"http://openquake.org/xmlns/nrml/0.5\"><logicTree logicTreeID=\"lt\">{root}{}</logicTree></nrml>",
        bsets.concat()
    )
}

fn loader(smlt_xml: &str) -> Arc<dyn FileLoader> {
    loader_with(smlt_xml, GMPE)
}

fn loader_with(smlt_xml: &str, gmpe_xml: &str) -> Arc<dyn FileLoader> {
    MemoryLoader::new()
        .with_file("case/smlt.xml", smlt_xml)
        .with_file("case/gmpe.xml", gmpe_xml)
        .with_file("case/sm.xml", SM)
        .shared()
}

fn config(samples: u32, method: SamplingMethod) -> LogicTreeConfig {
    let mut config = LogicTreeConfig::default().with_samples(samples, method);
    config.source_model_logic_tree_file = Some(PathBuf::from("case/smlt.xml"));
    config.gsim_logic_tree_file = Some(PathBuf::from("case/gmpe.xml"));
    config
}

fn build(samples: u32, method: SamplingMethod) -> FullLogicTree {
    FullLogicTree::from_config(loader(&smlt(&[])), &config(samples, method)).unwrap()
}

#[test]
fn test_early_weights_are_uniform() {
    let full = build(10, SamplingMethod::EarlyWeights);
    let rlzs = full.get_realizations();
    assert_eq!(rlzs.len(), 10);
    assert!(rlzs.iter().all(|r| (r.weight.total() - 0.1).abs() < 1e-12));
    assert_eq!(full.sm_rlzs.len(), 1);
    assert_eq!(full.sm_rlzs[0].samples, 10);
    assert_eq!(full.get_num_paths(), 10);
}

#[test]
fn test_late_weights_are_proportional() {
    let full = build(10, SamplingMethod::LateWeights);
    let rlzs = full.get_realizations();
    assert_eq!(rlzs.len(), 10);
    let g1: Vec<f64> = rlzs
        .iter()
        .filter(|r| r.gsim_lt_path() == ["g1"])
        .map(|r| r.weight.total())
        .collect();
    let g2: Vec<f64> = rlzs
        .iter()
        .filter(|r| r.gsim_lt_path() == ["g2"])
        .map(|r| r.weight.total())
        .collect();
    assert_eq!((g1.len(), g2.len()), (8, 2));
    // each draw keeps its branch weight, rescaled by 8 * 0.9 + 2 * 0.1
    assert!(g1.iter().all(|w| (w - 0.9 / 7.4).abs() < 1e-12));
    assert!(g2.iter().all(|w| (w - 0.1 / 7.4).abs() < 1e-12));
    assert!((g1[0] / g2[0] - 9.0).abs() < 1e-9);
    let total: f64 = g1.iter().chain(&g2).sum();
    assert!((total - 1.0).abs() < 1e-12);
}

#[test]
fn test_late_latin_split() {
    let full = build(10, SamplingMethod::LateLatin);
    let weights: Vec<f64> = full.get_realizations().iter().map(|r| r.weight.total()).collect();
    let heavy = weights.iter().filter(|w| (**w - 0.18).abs() < 1e-12).count();
    let light = weights.iter().filter(|w| (**w - 0.02).abs() < 1e-12).count();
    assert_eq!((heavy, light), (5, 5));
    let total: f64 = weights.iter().sum();
    assert!((total - 1.0).abs() < 1e-12);
}

#[test]
fn test_full_enumeration() {
    let full = build(0, SamplingMethod::EarlyWeights);
    let weights: Vec<f64> = full.weights().iter().map(|w| w.total()).collect();
    assert_eq!(weights, vec![0.9, 0.1]);
    assert_eq!(full.get_num_potential_paths(), 2);
    assert_eq!(full.trts, vec!["Active Shallow Crust".to_string()]);
    assert_eq!(full.get_trt_smrs(None).unwrap(), vec![TrtSmr(0)]);
    assert_eq!(full.get_trt_smrs(Some("srcB")).unwrap(), vec![TrtSmr(0)]);
    assert_eq!(full.wget("PGA"), vec![0.9, 0.1]);
    assert!(full.get_trt_smrs(Some("srcZ")).is_err());

    let sampled = build(10, SamplingMethod::EarlyWeights);
    assert!(sampled.weights().iter().all(|w| (w.total() - 0.1).abs() < 1e-12));
}

/// Two source model paths times three gsims: six potential paths
fn six_path_tree(samples: u32, oversampling: Oversampling) -> FullLogicTree {
    let bset = format!(
        "<logicTreeBranchSet branchSetID=\"bs1\" uncertaintyType=\"bGRRelative\" applyToSources=\"srcA\">{}{}</logicTreeBranchSet>",
        branch("c1", "-0.1", "0.6"),
        branch("c2", "0.1", "0.4")
    );
    let mut cfg = config(samples, SamplingMethod::EarlyWeights);
    cfg.oversampling = oversampling;
    FullLogicTree::from_config(loader_with(&smlt(&[bset]), GMPE3), &cfg).unwrap()
}

#[test]
fn test_reduce_rlzs_merges_duplicates() {
    assert_eq!(six_path_tree(0, Oversampling::Tolerate).get_num_paths(), 6);

    let tolerated = six_path_tree(10, Oversampling::Tolerate);
    assert_eq!(tolerated.get_realizations().len(), 10);
    let mut counts: Vec<(String, usize)> = Vec::new();
    for rlz in tolerated.get_realizations() {
        let pid = rlz.pid();
        match counts.iter_mut().find(|(p, _)| *p == pid) {
            Some((_, n)) => *n += 1,
            None => counts.push((pid, 1)),
        }
    }
    // ten draws over six paths repeat at least one path
    assert!(counts.len() < 10);

    let reduced = six_path_tree(10, Oversampling::ReduceRlzs);
    let rlzs = reduced.get_realizations();
    assert_eq!(rlzs.len(), counts.len());
    for (i, (rlz, (pid, n))) in rlzs.iter().zip(&counts).enumerate() {
        assert_eq!(rlz.ordinal, i);
        assert_eq!(&rlz.pid(), pid);
        assert!((rlz.weight.total() - *n as f64 / 10.0).abs() < 1e-12, "{pid}: {:?}", rlz.weight);
    }
    let total: f64 = rlzs.iter().map(|r| r.weight.total()).sum();
    assert!((total - 1.0).abs() < 1e-12);
    let indexed: usize = reduced
        .get_trt_smrs(None)
        .unwrap()
        .into_iter()
        .map(|t| reduced.get_rlzs_by_gsim(t).unwrap().values().map(Vec::len).sum::<usize>())
        .sum();
    assert_eq!(indexed, rlzs.len());
}

fn source_specific_bsets() -> Vec<String> {
    vec![
        format!(
            "<logicTreeBranchSet branchSetID=\"bs1\" uncertaintyType=\"abGRAbsolute\" applyToSources=\"srcA\">{}{}</logicTreeBranchSet>",
            branch("ab1", "4.0 1.0", "0.5"),
            branch("ab2", "4.5 1.1", "0.5")
        ),
        format!(
            "<logicTreeBranchSet branchSetID=\"bs2\" uncertaintyType=\"maxMagGRAbsolute\" applyToSources=\"srcA\">{}{}{}</logicTreeBranchSet>",
            branch("mm1", "7.0", "0.3"),
            branch("mm2", "7.5", "0.3"),
            branch("mm3", "8.0", "0.4")
        ),
        format!(
            "<logicTreeBranchSet branchSetID=\"bs3\" uncertaintyType=\"bGRRelative\" applyToSources=\"srcB\">{}{}</logicTreeBranchSet>",
            branch("bg1", "-0.1", "0.5"),
            branch("bg2", "0.1", "0.5")
        ),
    ]
}

#[test]
fn test_source_specific_paths() {
    let loader = loader(&smlt(&source_specific_bsets()));
    let tree = SourceModelLogicTree::from_file(loader, "case/smlt.xml", &LogicTreeConfig::default()).unwrap();
    assert!(tree.is_source_specific);
    assert_eq!(tree.num_paths, 12);
    assert_eq!(tree.arena.count_paths(0), 12);
    let sslts = tree.decompose().unwrap();
    let counts: Vec<(Option<String>, u128)> = sslts.iter().map(|(k, v)| (k.clone(), v.num_paths)).collect();
    assert_eq!(
        counts,
        vec![(Some("srcA".to_string()), 6), (Some("srcB".to_string()), 2)]
    );
    let total: f64 = tree.realizations().iter().map(|r| r.weight).sum();
    assert!((total - 1.0).abs() < 1e-12);
}

#[test]
fn test_source_specific_duplicated_uncertainty() {
    let mut bsets = source_specific_bsets();
    bsets.push(format!(
        "<logicTreeBranchSet branchSetID=\"bs4\" uncertaintyType=\"maxMagGRAbsolute\" applyToSources=\"srcA\">{}</logicTreeBranchSet>",
        branch("mm4", "9.0", "1.0")
    ));
    let err = SourceModelLogicTree::from_file(loader(&smlt(&bsets)), "case/smlt.xml", &LogicTreeConfig::default())
        .unwrap_err();
    assert!(matches!(err, LogicTreeError::DuplicatedId(_)), "{err}");
}

#[test]
fn test_realization_limit() {
    // 25 independent two-branch sources give 2^25 paths
    let bsets: Vec<String> = (0..25)
        .map(|i| {
            format!(
                "<logicTreeBranchSet branchSetID=\"bs{}\" uncertaintyType=\"bGRRelative\" applyToSources=\"src{i}\">{}{}</logicTreeBranchSet>",
                i + 1,
                branch(&format!("x{i}"), "-0.1", "0.5"),
                branch(&format!("y{i}"), "0.1", "0.5")
            )
        })
        .collect();
    let cfg = config(0, SamplingMethod::EarlyWeights).with_test_mode(true);
    let err = FullLogicTree::from_config(loader(&smlt(&bsets)), &cfg).unwrap_err();
    assert!(matches!(err, LogicTreeError::Scale(_)), "{err}");
    assert!(err.to_string().contains(&TWO24.to_string()));
}

#[test]
fn test_source_routing() {
    let full = build(0, SamplingMethod::EarlyWeights);
    let srcs = vec![
        SourceRef::new("srcA", "Active Shallow Crust"),
        SourceRef::new("srcB;0", "Active Shallow Crust"),
    ];
    let routed = full.set_trt_smr(srcs.clone(), None, None).unwrap();
    assert_eq!(routed.len(), 2);
    assert_eq!(routed[0].trt_smr, vec![TrtSmr(0)]);
    assert_eq!(routed[1].trt_smr, vec![TrtSmr(0)]);
    let only_a = full.set_trt_smr(srcs, Some("srcA"), None).unwrap();
    assert_eq!(only_a.len(), 1);
    let groups = full
        .reduce_groups(vec![vec![SourceRef::new("srcA", "Active Shallow Crust")], vec![]])
        .unwrap();
    assert_eq!(groups.len(), 1);
}
