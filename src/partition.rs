/// A union-find over `2*nSamples` haplotypes for one output locus, plus the
/// locus's own genomic coordinates (spec.md §3, `Partition`).
pub struct Partition {
    parent: Vec<u32>,
    rank: Vec<u8>,
    pub chrom: u32,
    pub base_pos: u64,
    pub cm: f64,
    n_sets: usize,
}

impl Partition {
    pub fn new(n_haplotypes: usize, chrom: u32, base_pos: u64, cm: f64) -> Self {
        Self {
            parent: (0..n_haplotypes as u32).collect(),
            rank: vec![0; n_haplotypes],
            chrom,
            base_pos,
            cm,
            n_sets: n_haplotypes,
        }
    }

    pub fn n_sets(&self) -> usize {
        self.n_sets
    }

    pub fn n_haplotypes(&self) -> usize {
        self.parent.len()
    }

    /// Finds the root of `h` with path compression.
    pub fn find(&mut self, h: u32) -> u32 {
        let mut root = h;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cur = h;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    /// Unions the sets containing `a` and `b`; decrements `nSets` iff they
    /// were previously distinct.
    pub fn union(&mut self, a: u32, b: u32) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        let (small, big) = if self.rank[ra as usize] < self.rank[rb as usize] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small as usize] = big;
        if self.rank[ra as usize] == self.rank[rb as usize] {
            self.rank[big as usize] += 1;
        }
        self.n_sets -= 1;
    }

    /// Assigns every haplotype a cluster index `0..nClusters` in
    /// first-occurrence order, iterating haplotypes `0..n_haplotypes`
    /// ascending (the natural sample-column order of the output line).
    pub fn cluster_indices(&mut self) -> Vec<u32> {
        let n = self.n_haplotypes();
        let mut root_to_cluster = rustc_hash::FxHashMap::default();
        let mut out = Vec::with_capacity(n);
        for h in 0..n as u32 {
            let root = self.find(h);
            let next_idx = root_to_cluster.len() as u32;
            let idx = *root_to_cluster.entry(root).or_insert(next_idx);
            out.push(idx);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_reflexive_symmetric_transitive_equivalence() {
        let mut p = Partition::new(6, 0, 0, 0.0);
        p.union(0, 1);
        p.union(1, 2);
        p.union(4, 5);
        let idx = p.cluster_indices();
        assert_eq!(idx[0], idx[1]);
        assert_eq!(idx[1], idx[2]);
        assert_eq!(idx[4], idx[5]);
        assert_ne!(idx[0], idx[3]);
        assert_ne!(idx[0], idx[4]);
    }

    #[test]
    fn n_sets_tracks_distinct_roots() {
        let mut p = Partition::new(4, 0, 0, 0.0);
        assert_eq!(p.n_sets(), 4);
        p.union(0, 1);
        assert_eq!(p.n_sets(), 3);
        p.union(0, 1); // no-op, already joined
        assert_eq!(p.n_sets(), 3);
        p.union(2, 3);
        assert_eq!(p.n_sets(), 2);
    }

    #[test]
    fn cluster_indices_have_no_gaps_and_are_first_occurrence_ordered() {
        let mut p = Partition::new(5, 0, 0, 0.0);
        p.union(3, 1);
        let idx = p.cluster_indices();
        let mut seen: Vec<u32> = idx.clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen, (0..seen.len() as u32).collect::<Vec<_>>());
        // haplotype 0 is seen first -> cluster 0; haplotype 1 next -> cluster 1
        assert_eq!(idx[0], 0);
        assert_eq!(idx[1], 1);
        assert_eq!(idx[3], idx[1]);
    }
}
